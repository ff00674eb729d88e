// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project lifecycle operations.
//!
//! The manager fronts the store with validation and the destructive-action
//! confirmation policy; it is the only writer of aggregate project stats.

use crate::store::ProjectStore;
use crate::{Workspace, lock::BuildLock};
use chrono::Utc;
use idf_core::{ChunkConfig, ModelDescriptor, Project, SourceRecord};
use idf_error::{ErrorCode, FoundryError};
use tracing::info;

/// High-level project and source lifecycle.
#[derive(Clone)]
pub struct ProjectManager {
    store: ProjectStore,
}

impl ProjectManager {
    /// Manager over `workspace`.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            store: ProjectStore::new(workspace),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Create a project with a validated slug and a frozen configuration.
    ///
    /// # Errors
    ///
    /// `INVALID_INPUT` for a bad slug, `PROJECT_EXISTS` for a taken one.
    pub fn create_project(
        &self,
        id: &str,
        model: ModelDescriptor,
        chunking: ChunkConfig,
    ) -> Result<Project, FoundryError> {
        let project = Project::new(id, model, chunking)?;
        self.store.create_project(&project)?;
        info!(target: "idf.workspace", project = id, "project created");
        Ok(project)
    }

    /// Load a project.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND` when absent.
    pub fn get_project(&self, id: &str) -> Result<Project, FoundryError> {
        self.store.load_project(id)
    }

    /// All project slugs, sorted.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on read failure.
    pub fn list_projects(&self) -> Result<Vec<String>, FoundryError> {
        self.store.list_projects()
    }

    /// Delete a project and everything under it.
    ///
    /// # Errors
    ///
    /// `NOT_CONFIRMED` unless `confirm` is set; `PROJECT_NOT_FOUND` when
    /// absent; `BUILD_FAILED(reason=locked)` while a build is running.
    pub fn delete_project(&self, id: &str, confirm: bool) -> Result<(), FoundryError> {
        if !confirm {
            return Err(FoundryError::new(
                ErrorCode::NotConfirmed,
                format!("deleting project {id:?} is destructive"),
            )
            .with_suggestion("pass confirm=true to delete the project"));
        }
        // Refuse to delete under a running build; the guard releases the
        // lock immediately after the removal.
        let paths = self.store.paths(id);
        let _lock = BuildLock::acquire(&paths.lock_file)?;
        self.store.delete_project(id)?;
        info!(target: "idf.workspace", project = id, "project deleted");
        Ok(())
    }

    /// Register a source, bumping the project's source count.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND`, `DUPLICATE_SOURCE`, or `DB_ERROR`.
    pub fn add_source(
        &self,
        project_id: &str,
        record: SourceRecord,
    ) -> Result<SourceRecord, FoundryError> {
        // Fail on an unknown project before touching the ledger.
        self.store.load_project(project_id)?;
        self.store.append_source(project_id, &record)?;
        self.store.update_project(project_id, |p| {
            p.stats.total_sources += 1;
        })?;
        Ok(record)
    }

    /// List a project's sources.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND` or `DB_ERROR`.
    pub fn list_sources(&self, project_id: &str) -> Result<Vec<SourceRecord>, FoundryError> {
        self.store.load_project(project_id)?;
        self.store.read_sources(project_id)
    }

    /// Remove a source; `cascade` also drops its chunks and vectors.
    ///
    /// # Errors
    ///
    /// `NO_SOURCE` for an unknown id; `DB_ERROR` on rewrite failure.
    pub fn remove_source(
        &self,
        project_id: &str,
        source_id: &str,
        cascade: bool,
    ) -> Result<(), FoundryError> {
        let (chunks_removed, vectors_removed) =
            self.store.remove_source(project_id, source_id, cascade)?;
        self.store.update_project(project_id, |p| {
            p.stats.total_sources = p.stats.total_sources.saturating_sub(1);
            p.stats.total_chunks = p.stats.total_chunks.saturating_sub(chunks_removed);
            p.stats.total_vectors = p.stats.total_vectors.saturating_sub(vectors_removed);
        })?;
        Ok(())
    }

    /// Fold a finished build's totals into the project stats.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND` or `DB_ERROR`.
    pub fn record_build(
        &self,
        project_id: &str,
        chunks_added: u64,
        vectors_added: u64,
        errors: u64,
    ) -> Result<Project, FoundryError> {
        self.store.update_project(project_id, |p| {
            p.stats.total_chunks += chunks_added;
            p.stats.total_vectors += vectors_added;
            p.stats.total_errors += errors;
            p.stats.last_build_at = Some(Utc::now());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idf_core::SourceKind;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ProjectManager) {
        let dir = TempDir::new().unwrap();
        let manager = ProjectManager::new(Workspace::under(dir.path()));
        (dir, manager)
    }

    #[test]
    fn create_and_list() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();
        assert_eq!(m.list_projects().unwrap(), vec!["docs"]);
    }

    #[test]
    fn bad_slug_rejected_before_touching_disk() {
        let (_dir, m) = manager();
        let err = m
            .create_project("Not Valid", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(m.list_projects().unwrap().is_empty());
    }

    #[test]
    fn delete_requires_confirmation() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();

        let err = m.delete_project("docs", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotConfirmed);
        assert!(err.suggestion.is_some());
        assert_eq!(m.list_projects().unwrap().len(), 1);

        m.delete_project("docs", true).unwrap();
        assert!(m.list_projects().unwrap().is_empty());
    }

    #[test]
    fn delete_refused_while_locked() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();
        let paths = m.store().paths("docs");
        let _held = BuildLock::acquire(&paths.lock_file).unwrap();

        let err = m.delete_project("docs", true).unwrap_err();
        assert_eq!(err.code, ErrorCode::BuildFailed);
        assert_eq!(err.details["reason"], serde_json::json!("locked"));
    }

    #[test]
    fn add_source_updates_stats() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();
        m.add_source(
            "docs",
            SourceRecord::new(SourceKind::Url, "https://example.com/a", "a"),
        )
        .unwrap();

        assert_eq!(m.get_project("docs").unwrap().stats.total_sources, 1);
        assert_eq!(m.list_sources("docs").unwrap().len(), 1);
    }

    #[test]
    fn add_source_to_missing_project_fails() {
        let (_dir, m) = manager();
        let err = m
            .add_source(
                "ghost",
                SourceRecord::new(SourceKind::Url, "https://example.com/a", "a"),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProjectNotFound);
    }

    #[test]
    fn remove_source_decrements_stats() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();
        let rec = m
            .add_source(
                "docs",
                SourceRecord::new(SourceKind::Url, "https://example.com/a", "a"),
            )
            .unwrap();
        m.remove_source("docs", &rec.id, false).unwrap();
        assert_eq!(m.get_project("docs").unwrap().stats.total_sources, 0);
    }

    #[test]
    fn record_build_accumulates() {
        let (_dir, m) = manager();
        m.create_project("docs", ModelDescriptor::mock(8), ChunkConfig::default())
            .unwrap();
        m.record_build("docs", 10, 9, 1).unwrap();
        let project = m.record_build("docs", 5, 5, 0).unwrap();
        assert_eq!(project.stats.total_chunks, 15);
        assert_eq!(project.stats.total_vectors, 14);
        assert_eq!(project.stats.total_errors, 1);
        assert!(project.stats.last_build_at.is_some());
    }
}
