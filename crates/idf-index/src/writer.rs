// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk and vector log writers plus the sidecar vector manifest.
//!
//! Both logs are append-only within a project; `force` rebuilds and cascade
//! deletes rewrite them atomically.  The vector manifest (`collection`,
//! model, dimension, count) is refreshed after every append so external
//! tools can size the index without scanning the log.

use crate::jsonl;
use chrono::{DateTime, Utc};
use idf_core::{Chunk, EmbeddingRecord, ModelDescriptor};
use idf_error::{ErrorCode, FoundryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Chunk log filename inside `data/`.
pub const CHUNKS_LOG: &str = "chunks.jsonl";
/// Vector log filename inside `data/`.
pub const VECTORS_LOG: &str = "vectors.jsonl";
/// Sidecar manifest filename inside `data/`.
pub const VECTOR_MANIFEST: &str = "vector_manifest.json";

/// Sidecar description of the vector log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VectorManifest {
    /// Collection name (the project slug for the local backend).
    pub collection: String,
    /// Optional namespace within the collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Model every vector in the log was produced under.
    pub model: ModelDescriptor,
    /// Vector dimension.
    pub dimension: usize,
    /// Declared metadata fields available to retrieval filters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata_schema: BTreeMap<String, String>,
    /// Records currently in the log.
    pub count: u64,
    /// When the manifest was first written.
    pub created_at: DateTime<Utc>,
}

/// Writer over a project's `data/` directory.
#[derive(Debug, Clone)]
pub struct IndexWriter {
    data_dir: PathBuf,
}

impl IndexWriter {
    /// Writer rooted at `<project>/data`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The `data/` directory this writer owns.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -- Chunk log -----------------------------------------------------------

    /// Append chunks to the chunk log.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn append_chunks(&self, chunks: &[Chunk]) -> Result<(), FoundryError> {
        jsonl::append_jsonl(&self.data_dir.join(CHUNKS_LOG), chunks)
    }

    /// Read the whole chunk log.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn read_chunks(&self) -> Result<Vec<Chunk>, FoundryError> {
        jsonl::read_jsonl(&self.data_dir.join(CHUNKS_LOG))
    }

    // -- Vector log ----------------------------------------------------------

    /// Append embedding records and refresh the sidecar manifest.
    ///
    /// Returns the new total record count.
    ///
    /// # Errors
    ///
    /// `DIMENSION_MISMATCH` when a record's width deviates from the log;
    /// `DB_ERROR` on filesystem failure.
    pub fn append_vectors(
        &self,
        records: &[EmbeddingRecord],
        collection: &str,
    ) -> Result<u64, FoundryError> {
        if records.is_empty() {
            return Ok(self.manifest()?.map(|m| m.count).unwrap_or(0));
        }

        let dimension = records[0].vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(FoundryError::new(
                ErrorCode::DimensionMismatch,
                format!(
                    "record {} is {}-dim in a {dimension}-dim batch",
                    bad.chunk_id,
                    bad.vector.len()
                ),
            ));
        }
        if let Some(manifest) = self.manifest()? {
            if manifest.dimension != dimension {
                return Err(FoundryError::new(
                    ErrorCode::DimensionMismatch,
                    format!(
                        "vector log is {}-dim, batch is {dimension}-dim",
                        manifest.dimension
                    ),
                ));
            }
        }

        jsonl::append_jsonl(&self.data_dir.join(VECTORS_LOG), records)?;

        let mut manifest = self.manifest()?.unwrap_or_else(|| VectorManifest {
            collection: collection.to_string(),
            namespace: None,
            model: records[0].model.clone(),
            dimension,
            metadata_schema: default_metadata_schema(),
            count: 0,
            created_at: Utc::now(),
        });
        manifest.count += records.len() as u64;
        self.write_manifest(&manifest)?;

        debug!(
            target: "idf.index",
            appended = records.len(),
            total = manifest.count,
            "vector log extended"
        );
        Ok(manifest.count)
    }

    /// Read the whole vector log.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn read_vectors(&self) -> Result<Vec<EmbeddingRecord>, FoundryError> {
        jsonl::read_jsonl(&self.data_dir.join(VECTORS_LOG))
    }

    /// Chunk ids already present in the vector log.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn embedded_ids(&self) -> Result<HashSet<String>, FoundryError> {
        Ok(self
            .read_vectors()?
            .into_iter()
            .map(|r| r.chunk_id)
            .collect())
    }

    // -- Truncation ----------------------------------------------------------

    /// Drop every chunk and vector belonging to `source_ids`, rewriting both
    /// logs atomically.  Used by `force` rebuilds and cascade removals.
    ///
    /// Returns `(chunks_removed, vectors_removed)`.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` on filesystem failure.
    pub fn truncate_sources(
        &self,
        source_ids: &HashSet<String>,
    ) -> Result<(u64, u64), FoundryError> {
        let chunks = self.read_chunks()?;
        let (dropped, kept): (Vec<_>, Vec<_>) = chunks
            .into_iter()
            .partition(|c| source_ids.contains(&c.source_id));
        let dropped_ids: HashSet<&str> = dropped.iter().map(|c| c.id.as_str()).collect();

        let vectors = self.read_vectors()?;
        let before = vectors.len();
        let kept_vectors: Vec<_> = vectors
            .into_iter()
            .filter(|r| !dropped_ids.contains(r.chunk_id.as_str()))
            .collect();
        let vectors_removed = (before - kept_vectors.len()) as u64;

        jsonl::rewrite_jsonl(&self.data_dir.join(CHUNKS_LOG), &kept)?;
        jsonl::rewrite_jsonl(&self.data_dir.join(VECTORS_LOG), &kept_vectors)?;

        if let Some(mut manifest) = self.manifest()? {
            manifest.count = kept_vectors.len() as u64;
            self.write_manifest(&manifest)?;
        }
        Ok((dropped.len() as u64, vectors_removed))
    }

    // -- Manifest ------------------------------------------------------------

    /// Read the sidecar manifest, if one has been written.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when the manifest exists but cannot be parsed.
    pub fn manifest(&self) -> Result<Option<VectorManifest>, FoundryError> {
        let path = self.data_dir.join(VECTOR_MANIFEST);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_manifest(&self, manifest: &VectorManifest) -> Result<(), FoundryError> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(VECTOR_MANIFEST);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            use std::io::Write;
            file.write_all(serde_json::to_string_pretty(manifest)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// The metadata fields the local backend declares for retrieval filters.
pub fn default_metadata_schema() -> BTreeMap<String, String> {
    [
        ("source_id", "string"),
        ("doc_id", "string"),
        ("content_type", "string"),
        ("language", "string"),
        ("title", "string"),
        ("tags", "string[]"),
        ("page", "number"),
        ("hierarchy_level", "number"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
