// SPDX-License-Identifier: MIT OR Apache-2.0
//! Checkpoint persistence.
//!
//! The latest checkpoint lives at `data/checkpoints/latest.json`; every save
//! also lands a time-ordered archive copy (`ckpt_<uuid>.json`).  Writes are
//! atomic, so the latest checkpoint is always either absent or valid.

use crate::{Workspace, atomic_write_json, read_json_opt};
use idf_core::Checkpoint;
use idf_error::{ErrorCode, FoundryError};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Filename of the resumable checkpoint.
pub const LATEST: &str = "latest.json";

/// Checkpoint save/load/clear over a project's checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store for `project_id` inside `workspace`.
    pub fn new(workspace: &Workspace, project_id: &str) -> Self {
        Self {
            dir: workspace.project_paths(project_id).checkpoints_dir,
        }
    }

    /// Store over an explicit checkpoint directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `checkpoint` as the latest, plus an archive copy.
    ///
    /// # Errors
    ///
    /// `CHECKPOINT_WRITE_FAILED` on any filesystem failure; a failed save is
    /// fatal to the owning build, but the previous latest stays valid.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), FoundryError> {
        let write = || -> Result<(), FoundryError> {
            atomic_write_json(&self.dir.join(format!("{}.json", checkpoint.id)), checkpoint)?;
            atomic_write_json(&self.dir.join(LATEST), checkpoint)
        };
        write().map_err(|e| {
            FoundryError::new(
                ErrorCode::CheckpointWriteFailed,
                format!("persist checkpoint {}: {e}", checkpoint.id),
            )
            .with_detail("checkpoint_id", &checkpoint.id)
            .with_source(e)
        })?;
        debug!(
            target: "idf.workspace",
            checkpoint = %checkpoint.id,
            completed = checkpoint.completed_source_ids.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Load the latest checkpoint, if one exists.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the file exists but cannot be parsed.
    pub fn load_latest(&self) -> Result<Option<Checkpoint>, FoundryError> {
        read_json_opt(&self.dir.join(LATEST))
    }

    /// Remove the latest checkpoint (archives are kept).
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on removal failure.
    pub fn clear(&self) -> Result<(), FoundryError> {
        match fs::remove_file(self.dir.join(LATEST)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sorted archive checkpoint ids (time-ordered by the UUIDv7 suffix).
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the directory exists but cannot be read.
    pub fn archives(&self) -> Result<Vec<String>, FoundryError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in dir {
            let entry = entry?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if name.starts_with("ckpt_") {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
