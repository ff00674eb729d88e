// SPDX-License-Identifier: MIT OR Apache-2.0
//! Write-once blob store keyed by SHA-256.
//!
//! Blobs land at `raw/<sha256><ext>`; every write appends a provenance line
//! to `raw/raw_manifest.jsonl`.  Writes are idempotent: an existing blob is
//! returned as `skipped` without touching the ledger unless `force` is set.

use chrono::{DateTime, Utc};
use idf_core::hash;
use idf_error::{ErrorCode, FoundryError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the fetch ledger inside the blob root.
pub const RAW_MANIFEST: &str = "raw_manifest.jsonl";

/// Default per-blob byte cap (25 MiB).
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 25 * 1024 * 1024;

/// One line of `raw_manifest.jsonl`: where a blob came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawManifestLine {
    /// Source URI as given by the caller.
    pub uri: String,
    /// Content address of the blob.
    pub sha256: String,
    /// Blob size in bytes.
    pub bytes: u64,
    /// MIME type, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// When the bytes were fetched.
    pub fetched_at: DateTime<Utc>,
}

/// Result of a blob write.
#[derive(Debug, Clone)]
pub struct BlobEntry {
    /// Content address (lowercase hex SHA-256 of the bytes).
    pub sha256: String,
    /// Absolute path of the stored blob.
    pub path: PathBuf,
    /// Blob size in bytes.
    pub bytes: u64,
    /// MIME type recorded in the ledger.
    pub content_type: Option<String>,
    /// `true` when the blob already existed and the write was skipped.
    pub skipped: bool,
}

/// Write-once content-addressed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    max_bytes: u64,
}

impl BlobStore {
    /// Create a store rooted at `root` (usually `<project>/raw`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BLOB_BYTES,
        }
    }

    /// Override the per-blob byte cap.
    #[must_use]
    pub fn with_byte_cap(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured per-blob byte cap.
    pub fn byte_cap(&self) -> u64 {
        self.max_bytes
    }

    /// Store `data` under its content address.
    ///
    /// Returns `skipped = true` without appending a ledger line when the blob
    /// already exists and `force` is false.
    ///
    /// # Errors
    ///
    /// `FILE_TOO_LARGE` when `data` exceeds the byte cap; `DB_ERROR` when the
    /// filesystem write fails.
    pub fn write(
        &self,
        uri: &str,
        data: &[u8],
        content_type: Option<&str>,
        source_ext: Option<&str>,
        force: bool,
    ) -> Result<BlobEntry, FoundryError> {
        if data.len() as u64 > self.max_bytes {
            return Err(FoundryError::new(
                ErrorCode::FileTooLarge,
                format!("blob of {} bytes exceeds cap {}", data.len(), self.max_bytes),
            )
            .with_detail("uri", uri)
            .with_detail("bytes", data.len())
            .with_detail("max_bytes", self.max_bytes));
        }

        let sha256 = hash::sha256_hex(data);
        let ext = extension_for(content_type, source_ext);
        let path = self.root.join(format!("{sha256}{ext}"));

        if path.exists() && !force {
            debug!(target: "idf.fetch", %sha256, "blob exists, skipping write");
            return Ok(BlobEntry {
                sha256,
                path,
                bytes: data.len() as u64,
                content_type: content_type.map(str::to_string),
                skipped: true,
            });
        }

        fs::create_dir_all(&self.root)?;
        fs::write(&path, data)?;

        let line = RawManifestLine {
            uri: uri.to_string(),
            sha256: sha256.clone(),
            bytes: data.len() as u64,
            content_type: content_type.map(str::to_string),
            fetched_at: Utc::now(),
        };
        self.append_manifest(&line)?;

        Ok(BlobEntry {
            sha256,
            path,
            bytes: data.len() as u64,
            content_type: content_type.map(str::to_string),
            skipped: false,
        })
    }

    /// Read back the fetch ledger, tolerating a trailing partial line.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the ledger exists but cannot be read.
    pub fn manifest(&self) -> Result<Vec<RawManifestLine>, FoundryError> {
        let path = self.root.join(RAW_MANIFEST);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // A torn trailing line from an interrupted append reads as EOF.
            match serde_json::from_str(line) {
                Ok(parsed) => lines.push(parsed),
                Err(_) => break,
            }
        }
        Ok(lines)
    }

    fn append_manifest(&self, line: &RawManifestLine) -> Result<(), FoundryError> {
        let path = self.root.join(RAW_MANIFEST);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut json = serde_json::to_vec(line)?;
        json.push(b'\n');
        file.write_all(&json)?;
        Ok(())
    }
}

/// Map a MIME type (or, failing that, the source's own extension) to the
/// blob filename extension.  Unknown types land as `.bin`.
pub fn extension_for(content_type: Option<&str>, source_ext: Option<&str>) -> String {
    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or(ct).trim();
        let ext = match essence {
            "text/html" | "application/xhtml+xml" => Some(".html"),
            "text/plain" => Some(".txt"),
            "text/markdown" => Some(".md"),
            "text/csv" => Some(".csv"),
            "application/pdf" => Some(".pdf"),
            "application/json" => Some(".json"),
            "application/xml" | "text/xml" => Some(".xml"),
            _ => None,
        };
        if let Some(ext) = ext {
            return ext.to_string();
        }
    }
    match source_ext {
        Some(ext) if !ext.is_empty() => {
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{ext}")
            }
        }
        _ => ".bin".to_string(),
    }
}
