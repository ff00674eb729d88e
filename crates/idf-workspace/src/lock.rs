// SPDX-License-Identifier: MIT OR Apache-2.0
//! Advisory per-project build locks.
//!
//! At most one build per project: the lock is a `create_new` file in the
//! project directory holding the owner's pid and start time.  The guard
//! removes the file on every exit path, including panics, via `Drop`.

use idf_error::{ErrorCode, FoundryError};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// RAII guard over a project's `.build.lock`.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    /// Acquire the lock, failing fast when another build holds it.
    ///
    /// # Errors
    ///
    /// `BUILD_FAILED` with `details.reason = "locked"` when the lock file
    /// already exists; `DB_ERROR` on other filesystem failures.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, FoundryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let result = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        match result {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "{{\"pid\": {}, \"acquired_at\": {:?}}}",
                    std::process::id(),
                    chrono::Utc::now().to_rfc3339()
                );
                debug!(target: "idf.workspace", path = %path.display(), "build lock acquired");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(FoundryError::new(
                ErrorCode::BuildFailed,
                "another build holds the project lock",
            )
            .with_detail("reason", "locked")
            .with_detail("lock_file", path.display().to_string())
            .with_suggestion("wait for the running build or remove a stale .build.lock")),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "idf.workspace",
                    path = %self.path.display(),
                    error = %e,
                    "failed to release build lock"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_release_cycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".build.lock");

        let guard = BuildLock::acquire(&path).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());

        // Reacquirable after release.
        let _again = BuildLock::acquire(&path).unwrap();
    }

    #[test]
    fn contention_fails_fast_with_locked_reason() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".build.lock");

        let _held = BuildLock::acquire(&path).unwrap();
        let err = BuildLock::acquire(&path).unwrap_err();
        assert_eq!(err.code, ErrorCode::BuildFailed);
        assert_eq!(err.details["reason"], serde_json::json!("locked"));
    }

    #[test]
    fn lock_released_on_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".build.lock");
        let path_clone = path.clone();

        let result = std::panic::catch_unwind(move || {
            let _guard = BuildLock::acquire(&path_clone).unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!path.exists(), "guard drop must run during unwind");
    }
}
