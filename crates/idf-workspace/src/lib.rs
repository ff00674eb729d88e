// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-workspace
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Checkpoint persistence.
pub mod checkpoint;
/// Advisory per-project build locks.
pub mod lock;
/// Project and source lifecycle operations.
pub mod manager;
/// Optional fine-grained run directories.
pub mod runs;
/// Project and source ledger persistence.
pub mod store;

pub use checkpoint::CheckpointStore;
pub use lock::BuildLock;
pub use manager::ProjectManager;
pub use store::ProjectStore;

use idf_error::FoundryError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the projects directory.
pub const PROJECTS_DIR_ENV: &str = "FOUNDRY_PROJECTS_DIR";
/// Environment variable overriding the runs directory.
pub const RUNS_DIR_ENV: &str = "FOUNDRY_RUNS_DIR";

/// Resolved workspace roots; replaces any module-level singleton so tests
/// construct a fresh handle pointing at a temporary directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    projects_dir: PathBuf,
    runs_dir: PathBuf,
}

impl Workspace {
    /// Explicit roots.
    pub fn new(projects_dir: impl Into<PathBuf>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            runs_dir: runs_dir.into(),
        }
    }

    /// Roots from `FOUNDRY_PROJECTS_DIR` / `FOUNDRY_RUNS_DIR`, defaulting to
    /// `./projects` and `./runs`.
    pub fn from_env() -> Self {
        let projects = std::env::var(PROJECTS_DIR_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "./projects".into());
        let runs = std::env::var(RUNS_DIR_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "./runs".into());
        Self::new(projects, runs)
    }

    /// Both roots under one base directory (the common test shape).
    pub fn under(base: &Path) -> Self {
        Self::new(base.join("projects"), base.join("runs"))
    }

    /// The projects root.
    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// The runs root.
    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Filesystem layout of one project.
    pub fn project_paths(&self, project_id: &str) -> ProjectPaths {
        let root = self.projects_dir.join(project_id);
        ProjectPaths {
            project_json: root.join("project.json"),
            sources_jsonl: root.join("sources.jsonl"),
            data_dir: root.join("data"),
            checkpoints_dir: root.join("data").join("checkpoints"),
            raw_dir: root.join("raw"),
            lock_file: root.join(".build.lock"),
            root,
        }
    }
}

/// The bit-exact per-project layout.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    /// `<projects>/<id>/`.
    pub root: PathBuf,
    /// Project manifest.
    pub project_json: PathBuf,
    /// Source ledger.
    pub sources_jsonl: PathBuf,
    /// Chunk/vector logs and the vector manifest.
    pub data_dir: PathBuf,
    /// Checkpoint files.
    pub checkpoints_dir: PathBuf,
    /// Content-addressed blobs.
    pub raw_dir: PathBuf,
    /// Advisory build lock.
    pub lock_file: PathBuf,
}

/// Atomically persist `value` as pretty JSON: write a temp file, fsync,
/// rename over the target.  No half-written JSON is ever observable.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FoundryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON file, `Ok(None)` when absent.
pub(crate) fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FoundryError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
