// SPDX-License-Identifier: MIT OR Apache-2.0
//! The error taxonomy is a stable cross-crate contract: codes, wire form,
//! and recoverability hints must not drift.

use idf_error::{ErrorCategory, ErrorCode, ErrorDto, FoundryError};

const CATALOG: &[(ErrorCode, &str, ErrorCategory)] = &[
    (ErrorCode::InvalidInput, "INVALID_INPUT", ErrorCategory::Input),
    (ErrorCode::NotConfirmed, "NOT_CONFIRMED", ErrorCategory::Input),
    (ErrorCode::InvalidFilter, "INVALID_FILTER", ErrorCategory::Input),
    (ErrorCode::ProjectExists, "PROJECT_EXISTS", ErrorCategory::Workspace),
    (ErrorCode::ProjectNotFound, "PROJECT_NOT_FOUND", ErrorCategory::Workspace),
    (ErrorCode::RunNotFound, "RUN_NOT_FOUND", ErrorCategory::Workspace),
    (ErrorCode::DuplicateSource, "DUPLICATE_SOURCE", ErrorCategory::Workspace),
    (ErrorCode::NoSource, "NO_SOURCE", ErrorCategory::Workspace),
    (ErrorCode::FetchFailed, "FETCH_FAILED", ErrorCategory::Fetch),
    (ErrorCode::FetchTimeout, "FETCH_TIMEOUT", ErrorCategory::Fetch),
    (ErrorCode::DomainBlocked, "DOMAIN_BLOCKED", ErrorCategory::Fetch),
    (ErrorCode::FileTooLarge, "FILE_TOO_LARGE", ErrorCategory::Fetch),
    (ErrorCode::ParseError, "PARSE_ERROR", ErrorCategory::Fetch),
    (ErrorCode::ChunkError, "CHUNK_ERROR", ErrorCategory::Build),
    (ErrorCode::MissingApiKey, "MISSING_API_KEY", ErrorCategory::Build),
    (ErrorCode::EmbedProviderError, "EMBED_PROVIDER_ERROR", ErrorCategory::Build),
    (ErrorCode::DimensionMismatch, "DIMENSION_MISMATCH", ErrorCategory::Build),
    (ErrorCode::BuildFailed, "BUILD_FAILED", ErrorCategory::Build),
    (ErrorCode::BuildTimeout, "BUILD_TIMEOUT", ErrorCategory::Build),
    (ErrorCode::DbError, "DB_ERROR", ErrorCategory::Storage),
    (ErrorCode::CheckpointWriteFailed, "CHECKPOINT_WRITE_FAILED", ErrorCategory::Storage),
    (ErrorCode::ExportFailed, "EXPORT_FAILED", ErrorCategory::Storage),
    (ErrorCode::AlreadyRunning, "ALREADY_RUNNING", ErrorCategory::Server),
    (ErrorCode::NotRunning, "NOT_RUNNING", ErrorCategory::Server),
    (ErrorCode::ServeFailed, "SERVE_FAILED", ErrorCategory::Server),
];

#[test]
fn every_code_keeps_its_wire_string_and_category() {
    for (code, wire, category) in CATALOG {
        assert_eq!(code.as_str(), *wire);
        assert_eq!(code.category(), *category);
        let json = serde_json::to_string(code).unwrap();
        assert_eq!(json, format!("\"{wire}\""));
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, *code);
    }
}

#[test]
fn catalog_is_exhaustive() {
    assert_eq!(CATALOG.len(), 25);
}

#[test]
fn timeouts_are_recoverable_by_default() {
    for code in [ErrorCode::FetchTimeout, ErrorCode::BuildTimeout] {
        assert!(FoundryError::new(code, "t").recoverable, "{code} recoverable");
    }
}

#[test]
fn integrity_errors_are_not_recoverable() {
    for code in [
        ErrorCode::DomainBlocked,
        ErrorCode::MissingApiKey,
        ErrorCode::DimensionMismatch,
        ErrorCode::NotConfirmed,
        ErrorCode::CheckpointWriteFailed,
    ] {
        assert!(!FoundryError::new(code, "x").recoverable, "{code} fatal");
    }
}

#[test]
fn wire_dto_shape_is_stable() {
    let err = FoundryError::new(ErrorCode::DomainBlocked, "host example.com is not allowlisted")
        .with_detail("host", "example.com")
        .with_suggestion("add the hostname to allow_domains");
    let dto: ErrorDto = err.into();
    let json = serde_json::to_value(&dto).unwrap();

    assert_eq!(json["code"], "DOMAIN_BLOCKED");
    assert_eq!(json["recoverable"], false);
    assert_eq!(json["details"]["host"], "example.com");
    assert!(json["suggestion"].as_str().unwrap().contains("allow_domains"));

    let back: ErrorDto = serde_json::from_value(json).unwrap();
    assert_eq!(back, dto);
}
