// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-address hashing helpers.
//!
//! All identities in the foundry are lowercase-hex SHA-256: document ids hash
//! the raw source bytes, chunk ids hash `doc_id:byte_start:byte_end`, and
//! project configuration hashes pin the frozen `(model, chunking)` pair.

use idf_error::FoundryError;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Document id: SHA-256 over the raw fetched bytes.
pub fn doc_id(raw: &[u8]) -> String {
    sha256_hex(raw)
}

/// Chunk id: SHA-256 over `doc_id:byte_start:byte_end`.
///
/// Depends only on the document identity and the byte span, so reprocessing
/// the same bytes always yields the same id.
pub fn chunk_id(doc_id: &str, byte_start: usize, byte_end: usize) -> String {
    sha256_hex(format!("{doc_id}:{byte_start}:{byte_end}").as_bytes())
}

/// Hash a frozen configuration pair into the project manifest.
///
/// Uses the canonical `serde_json` rendering of the two values; field order
/// is struct-declaration order, which is stable for a pinned format version.
///
/// # Errors
///
/// Returns `DB_ERROR` when either value fails to serialise.
pub fn config_sha256<M: Serialize, C: Serialize>(
    model: &M,
    chunking: &C,
) -> Result<String, FoundryError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(model)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(chunking)?);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}
