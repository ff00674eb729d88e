// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only JSONL files.
//!
//! One JSON object per `\n`-terminated line, UTF-8.  Readers tolerate a
//! trailing partial line (an interrupted append) by treating it as EOF, so a
//! retriever loading mid-build only ever observes whole records.

use idf_error::FoundryError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Read every whole record from `path`; a missing file reads as empty.
///
/// # Errors
///
/// `DB_ERROR` when the file exists but cannot be read.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FoundryError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            // A torn tail from an interrupted append reads as EOF.
            Err(_) => break,
        }
    }
    Ok(records)
}

/// Append `records` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// `DB_ERROR` on serialisation or filesystem failure.
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), FoundryError> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&buf)?;
    Ok(())
}

/// Atomically replace `path` with `records` (write temp, fsync, rename).
///
/// Used by cascade deletes and forced rebuilds; ordinary writes append.
///
/// # Errors
///
/// `DB_ERROR` on serialisation or filesystem failure.
pub fn rewrite_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), FoundryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        for record in records {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            file.write_all(&line)?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
