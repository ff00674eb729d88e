// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project manifest and source ledger persistence.
//!
//! `project.json` mutations run under an exclusive in-process per-project
//! lock and land atomically (temp + fsync + rename).  The source ledger is
//! one record per line; status updates rewrite the whole file atomically so
//! a crash between steps leaves a consistent ledger.

use crate::{ProjectPaths, Workspace, atomic_write_json, read_json_opt};
use idf_core::{Project, SourceRecord};
use idf_error::{ErrorCode, FoundryError};
use idf_index::jsonl;
use idf_index::writer::IndexWriter;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistence front-end for projects and their source ledgers.
#[derive(Clone)]
pub struct ProjectStore {
    workspace: Workspace,
    // Per-project write locks; the advisory file lock serialises builds
    // across processes, this serialises mutators within one.
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ProjectStore {
    /// Store over `workspace`.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The workspace this store persists into.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Layout of `project_id`.
    pub fn paths(&self, project_id: &str) -> ProjectPaths {
        self.workspace.project_paths(project_id)
    }

    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // -- Projects ------------------------------------------------------------

    /// Persist a freshly constructed project.
    ///
    /// # Errors
    ///
    /// `PROJECT_EXISTS` when the slug is taken; `DB_ERROR` on filesystem
    /// failure.
    pub fn create_project(&self, project: &Project) -> Result<(), FoundryError> {
        let paths = self.paths(&project.id);
        if paths.project_json.exists() {
            return Err(FoundryError::new(
                ErrorCode::ProjectExists,
                format!("project {:?} already exists", project.id),
            )
            .with_detail("project_id", &project.id));
        }
        fs::create_dir_all(&paths.data_dir)?;
        fs::create_dir_all(&paths.raw_dir)?;
        atomic_write_json(&paths.project_json, project)?;
        debug!(target: "idf.workspace", project = %project.id, "project created");
        Ok(())
    }

    /// Load a project by slug.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND` when absent; `DB_ERROR` on read failure.
    pub fn load_project(&self, project_id: &str) -> Result<Project, FoundryError> {
        read_json_opt(&self.paths(project_id).project_json)?.ok_or_else(|| {
            FoundryError::new(
                ErrorCode::ProjectNotFound,
                format!("no project {project_id:?}"),
            )
            .with_detail("project_id", project_id)
        })
    }

    /// Read-modify-write a project under the in-process lock.
    ///
    /// The mutator sees the current state; the result is stamped with a new
    /// `updated_at` and persisted atomically.
    ///
    /// # Errors
    ///
    /// As [`ProjectStore::load_project`] plus write failures.
    pub fn update_project<F>(&self, project_id: &str, mutate: F) -> Result<Project, FoundryError>
    where
        F: FnOnce(&mut Project),
    {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().expect("project lock poisoned");

        let mut project = self.load_project(project_id)?;
        mutate(&mut project);
        project.updated_at = chrono::Utc::now();
        atomic_write_json(&self.paths(project_id).project_json, &project)?;
        Ok(project)
    }

    /// All project slugs, sorted.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the projects root exists but cannot be read.
    pub fn list_projects(&self) -> Result<Vec<String>, FoundryError> {
        let dir = match fs::read_dir(self.workspace.projects_dir()) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in dir {
            let entry = entry?;
            if entry.path().join("project.json").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove a project directory wholesale.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND` when absent; `DB_ERROR` on removal failure.
    pub fn delete_project(&self, project_id: &str) -> Result<(), FoundryError> {
        let paths = self.paths(project_id);
        if !paths.project_json.exists() {
            return Err(FoundryError::new(
                ErrorCode::ProjectNotFound,
                format!("no project {project_id:?}"),
            ));
        }
        fs::remove_dir_all(&paths.root)?;
        Ok(())
    }

    // -- Sources -------------------------------------------------------------

    /// Read the source ledger.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on read failure.
    pub fn read_sources(&self, project_id: &str) -> Result<Vec<SourceRecord>, FoundryError> {
        jsonl::read_jsonl(&self.paths(project_id).sources_jsonl)
    }

    /// Append a source to the ledger.
    ///
    /// # Errors
    ///
    /// `DUPLICATE_SOURCE` when the same kind + URI is already registered;
    /// `DB_ERROR` on write failure.
    pub fn append_source(
        &self,
        project_id: &str,
        record: &SourceRecord,
    ) -> Result<(), FoundryError> {
        let existing = self.read_sources(project_id)?;
        if existing
            .iter()
            .any(|s| s.kind == record.kind && s.uri == record.uri)
        {
            return Err(FoundryError::new(
                ErrorCode::DuplicateSource,
                format!("source {:?} ({}) is already registered", record.uri, record.kind),
            )
            .with_detail("uri", &record.uri)
            .with_suggestion("remove the existing source first, or rebuild with force"));
        }
        jsonl::append_jsonl(
            &self.paths(project_id).sources_jsonl,
            std::slice::from_ref(record),
        )
    }

    /// Mutate one source record, rewriting the ledger atomically.
    ///
    /// # Errors
    ///
    /// `NO_SOURCE` when the id is unknown; `DB_ERROR` on write failure.
    pub fn update_source<F>(
        &self,
        project_id: &str,
        source_id: &str,
        mutate: F,
    ) -> Result<SourceRecord, FoundryError>
    where
        F: FnOnce(&mut SourceRecord),
    {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().expect("project lock poisoned");

        let mut sources = self.read_sources(project_id)?;
        let record = sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| {
                FoundryError::new(ErrorCode::NoSource, format!("no source {source_id:?}"))
                    .with_detail("source_id", source_id)
            })?;
        mutate(record);
        let updated = record.clone();
        jsonl::rewrite_jsonl(&self.paths(project_id).sources_jsonl, &sources)?;
        Ok(updated)
    }

    /// Remove a source; with `cascade`, also rewrite the chunk and vector
    /// logs omitting the source's records.
    ///
    /// Returns `(chunks_removed, vectors_removed)` (zero without cascade).
    ///
    /// # Errors
    ///
    /// `NO_SOURCE` when the id is unknown; `DB_ERROR` on write failure.
    pub fn remove_source(
        &self,
        project_id: &str,
        source_id: &str,
        cascade: bool,
    ) -> Result<(u64, u64), FoundryError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().expect("project lock poisoned");

        let sources = self.read_sources(project_id)?;
        if !sources.iter().any(|s| s.id == source_id) {
            return Err(
                FoundryError::new(ErrorCode::NoSource, format!("no source {source_id:?}"))
                    .with_detail("source_id", source_id),
            );
        }
        let kept: Vec<SourceRecord> = sources.into_iter().filter(|s| s.id != source_id).collect();
        jsonl::rewrite_jsonl(&self.paths(project_id).sources_jsonl, &kept)?;

        if cascade {
            let writer = IndexWriter::new(self.paths(project_id).data_dir);
            return writer.truncate_sources(&HashSet::from([source_id.to_string()]));
        }
        Ok((0, 0))
    }
}
