// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for Index Foundry.
//!
//! Every foundry error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, a `recoverable` hint for callers,
//! an optional remediation suggestion, and arbitrary key-value details.  Use
//! the builder returned by [`FoundryError::new`] to construct errors
//! fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller-supplied input failed validation.
    Input,
    /// Project / workspace layout errors.
    Workspace,
    /// Content retrieval errors.
    Fetch,
    /// Build pipeline errors.
    Build,
    /// On-disk persistence errors.
    Storage,
    /// Search-server lifecycle errors.
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Workspace => "workspace",
            Self::Fetch => "fetch",
            Self::Build => "build",
            Self::Storage => "storage",
            Self::Server => "server",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Input validation --
    /// A caller-supplied argument is malformed or out of range.
    InvalidInput,
    /// A destructive operation was invoked without its confirmation flag.
    NotConfirmed,
    /// A retrieval filter referenced an undeclared field or operator.
    InvalidFilter,

    // -- Workspace --
    /// The project slug is already taken.
    ProjectExists,
    /// No project with the given slug exists.
    ProjectNotFound,
    /// No run with the given id exists.
    RunNotFound,
    /// The source is already registered for this project.
    DuplicateSource,
    /// The project has no source matching the given id.
    NoSource,

    // -- Fetch --
    /// The remote returned an error status or the transport failed.
    FetchFailed,
    /// The fetch did not complete within its deadline.
    FetchTimeout,
    /// The hostname is outside the allowlist or on the blocklist.
    DomainBlocked,
    /// The payload exceeds the configured byte cap.
    FileTooLarge,
    /// The payload failed format validation (e.g. bad `%PDF` magic).
    ParseError,

    // -- Build --
    /// The chunker rejected the document.
    ChunkError,
    /// The environment variable named by `api_key_env` is unset or empty.
    MissingApiKey,
    /// The embedding provider returned an error.
    EmbedProviderError,
    /// A batch returned vectors of a different dimension than the project.
    DimensionMismatch,
    /// The build aborted before completing its working set.
    BuildFailed,
    /// The build hit its invocation deadline.
    BuildTimeout,

    // -- Storage --
    /// A read or write against the project's logs failed.
    DbError,
    /// A checkpoint could not be persisted durably.
    CheckpointWriteFailed,
    /// A project export could not be produced.
    ExportFailed,

    // -- Server --
    /// A search server is already registered for this project.
    AlreadyRunning,
    /// No search server is registered for this project.
    NotRunning,
    /// The search server failed to bind or serve.
    ServeFailed,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput | Self::NotConfirmed | Self::InvalidFilter => ErrorCategory::Input,

            Self::ProjectExists
            | Self::ProjectNotFound
            | Self::RunNotFound
            | Self::DuplicateSource
            | Self::NoSource => ErrorCategory::Workspace,

            Self::FetchFailed
            | Self::FetchTimeout
            | Self::DomainBlocked
            | Self::FileTooLarge
            | Self::ParseError => ErrorCategory::Fetch,

            Self::ChunkError
            | Self::MissingApiKey
            | Self::EmbedProviderError
            | Self::DimensionMismatch
            | Self::BuildFailed
            | Self::BuildTimeout => ErrorCategory::Build,

            Self::DbError | Self::CheckpointWriteFailed | Self::ExportFailed => {
                ErrorCategory::Storage
            }

            Self::AlreadyRunning | Self::NotRunning | Self::ServeFailed => ErrorCategory::Server,
        }
    }

    /// Default recoverability for this code, before per-error overrides.
    ///
    /// Timeouts are always recoverable; domain blocks, dimension mismatches,
    /// and missing credentials never are.  `FETCH_FAILED` defaults to
    /// non-recoverable and is upgraded per response status by the fetcher
    /// (5xx, 408, 429).
    pub fn default_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FetchTimeout | Self::BuildTimeout | Self::EmbedProviderError
        )
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"FETCH_TIMEOUT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotConfirmed => "NOT_CONFIRMED",
            Self::InvalidFilter => "INVALID_FILTER",
            Self::ProjectExists => "PROJECT_EXISTS",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::RunNotFound => "RUN_NOT_FOUND",
            Self::DuplicateSource => "DUPLICATE_SOURCE",
            Self::NoSource => "NO_SOURCE",
            Self::FetchFailed => "FETCH_FAILED",
            Self::FetchTimeout => "FETCH_TIMEOUT",
            Self::DomainBlocked => "DOMAIN_BLOCKED",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::ParseError => "PARSE_ERROR",
            Self::ChunkError => "CHUNK_ERROR",
            Self::MissingApiKey => "MISSING_API_KEY",
            Self::EmbedProviderError => "EMBED_PROVIDER_ERROR",
            Self::DimensionMismatch => "DIMENSION_MISMATCH",
            Self::BuildFailed => "BUILD_FAILED",
            Self::BuildTimeout => "BUILD_TIMEOUT",
            Self::DbError => "DB_ERROR",
            Self::CheckpointWriteFailed => "CHECKPOINT_WRITE_FAILED",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::NotRunning => "NOT_RUNNING",
            Self::ServeFailed => "SERVE_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FoundryError
// ---------------------------------------------------------------------------

/// Unified foundry error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, a `recoverable`
/// hint, an optional remediation suggestion, structured details, and an
/// optional source error for cause-chaining.
///
/// # Builder usage
///
/// ```
/// use idf_error::{ErrorCode, FoundryError};
///
/// let err = FoundryError::new(ErrorCode::FetchTimeout, "timed out after 30 s")
///     .with_detail("url", "https://example.com/docs")
///     .with_suggestion("raise the per-request timeout or retry later");
/// assert!(err.recoverable);
/// ```
pub struct FoundryError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the operation can reasonably succeed.
    pub recoverable: bool,
    /// Optional remediation hint surfaced to callers verbatim.
    pub suggestion: Option<String>,
    /// Arbitrary structured context for diagnostics.
    pub details: BTreeMap<String, serde_json::Value>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FoundryError {
    /// Create a new error with the given code and message.
    ///
    /// Recoverability starts at [`ErrorCode::default_recoverable`] and can be
    /// overridden with [`FoundryError::recoverable`].
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: code.default_recoverable(),
            suggestion: None,
            details: BTreeMap::new(),
            source: None,
        }
    }

    /// Override the `recoverable` hint.
    #[must_use]
    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Attach a remediation suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a key-value pair to the structured details.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for FoundryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("FoundryError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        d.field("recoverable", &self.recoverable);
        if let Some(ref s) = self.suggestion {
            d.field("suggestion", s);
        }
        if !self.details.is_empty() {
            d.field("details", &self.details);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        d.finish()
    }
}

impl fmt::Display for FoundryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.details.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(details) = serde_json::to_string(&self.details) {
                write!(f, " {details}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FoundryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for FoundryError {
    fn from(err: std::io::Error) -> Self {
        FoundryError::new(ErrorCode::DbError, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for FoundryError {
    fn from(err: serde_json::Error) -> Self {
        FoundryError::new(ErrorCode::DbError, err.to_string()).with_source(err)
    }
}

/// Convenience alias used across foundry crates.
pub type Result<T, E = FoundryError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`FoundryError`] (without the opaque source).
///
/// This is the wire form surfaced by the search API and recorded in build
/// manifests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Whether retrying can reasonably succeed.
    pub recoverable: bool,
    /// Remediation hint, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Structured details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<&FoundryError> for ErrorDto {
    fn from(err: &FoundryError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            recoverable: err.recoverable,
            suggestion: err.suggestion.clone(),
            details: err.details.clone(),
        }
    }
}

impl From<FoundryError> for ErrorDto {
    fn from(err: FoundryError) -> Self {
        (&err).into()
    }
}

impl From<ErrorDto> for FoundryError {
    fn from(dto: ErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            recoverable: dto.recoverable,
            suggestion: dto.suggestion,
            details: dto.details,
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
