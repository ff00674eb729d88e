// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional fine-grained run directories.
//!
//! A run is a scratch pipeline workspace under `<runs>/<uuid7>/` with one
//! subdirectory per phase and `manifest.json` / `config.json` at the root.
//! Builds that go through the project layout don't need runs; exports and
//! ad-hoc pipeline invocations do.

use crate::{Workspace, atomic_write_json, read_json_opt};
use idf_core::{BuildManifest, BuildStatus};
use idf_error::{ErrorCode, FoundryError};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Phase subdirectories created inside every run.
pub const RUN_PHASES: &[&str] = &[
    "raw",
    "extracted",
    "normalized",
    "indexed",
    "served",
    "logs",
];

/// Handle to one run directory.
#[derive(Debug, Clone)]
pub struct RunDir {
    /// Time-ordered run id (UUIDv7 string form).
    pub id: String,
    /// `<runs>/<id>/`.
    pub root: PathBuf,
}

impl RunDir {
    /// Create a fresh run under the workspace, scaffolding phase dirs and
    /// persisting the frozen `config` and a running manifest.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn create(
        workspace: &Workspace,
        config: &serde_json::Value,
        config_sha256: &str,
    ) -> Result<Self, FoundryError> {
        let id = Uuid::now_v7().to_string();
        let root = workspace.runs_dir().join(&id);
        for phase in RUN_PHASES {
            fs::create_dir_all(root.join(phase))?;
        }
        atomic_write_json(&root.join("config.json"), config)?;
        atomic_write_json(
            &root.join("manifest.json"),
            &BuildManifest::start(config_sha256),
        )?;
        Ok(Self { id, root })
    }

    /// Open an existing run.
    ///
    /// # Errors
    ///
    /// `RUN_NOT_FOUND` when the directory is absent.
    pub fn open(workspace: &Workspace, run_id: &str) -> Result<Self, FoundryError> {
        let root = workspace.runs_dir().join(run_id);
        if !root.is_dir() {
            return Err(
                FoundryError::new(ErrorCode::RunNotFound, format!("no run {run_id:?}"))
                    .with_detail("run_id", run_id),
            );
        }
        Ok(Self {
            id: run_id.to_string(),
            root,
        })
    }

    /// Read the run manifest.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the manifest is missing or unreadable.
    pub fn manifest(&self) -> Result<BuildManifest, FoundryError> {
        read_json_opt(&self.root.join("manifest.json"))?.ok_or_else(|| {
            FoundryError::new(ErrorCode::DbError, "run manifest missing")
                .with_detail("run_id", &self.id)
        })
    }

    /// Replace the run manifest atomically.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on write failure.
    pub fn write_manifest(&self, manifest: &BuildManifest) -> Result<(), FoundryError> {
        atomic_write_json(&self.root.join("manifest.json"), manifest)
    }

    /// Close the run with a terminal status.
    ///
    /// # Errors
    ///
    /// As [`RunDir::manifest`] and [`RunDir::write_manifest`].
    pub fn finish(&self, status: BuildStatus) -> Result<(), FoundryError> {
        let mut manifest = self.manifest()?;
        manifest.finish(status);
        self.write_manifest(&manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_scaffolds_phases() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::under(dir.path());
        let run = RunDir::create(&ws, &serde_json::json!({"k": 1}), "ab".repeat(32).as_str())
            .unwrap();

        for phase in RUN_PHASES {
            assert!(run.root.join(phase).is_dir(), "{phase} missing");
        }
        assert!(run.root.join("config.json").exists());
        assert_eq!(run.manifest().unwrap().status, BuildStatus::Running);
    }

    #[test]
    fn open_missing_run_fails() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::under(dir.path());
        let err = RunDir::open(&ws, "01990000-dead-beef-0000-000000000000").unwrap_err();
        assert_eq!(err.code, ErrorCode::RunNotFound);
    }

    #[test]
    fn finish_stamps_terminal_status() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::under(dir.path());
        let run = RunDir::create(&ws, &serde_json::json!({}), "00").unwrap();
        run.finish(BuildStatus::Completed).unwrap();

        let manifest = RunDir::open(&ws, &run.id).unwrap().manifest().unwrap();
        assert_eq!(manifest.status, BuildStatus::Completed);
        assert!(manifest.completed_at.is_some());
    }

    #[test]
    fn run_ids_are_time_ordered() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::under(dir.path());
        let a = RunDir::create(&ws, &serde_json::json!({}), "00").unwrap();
        let b = RunDir::create(&ws, &serde_json::json!({}), "00").unwrap();
        assert!(a.id < b.id, "uuid7 ids sort by creation time");
    }
}
