// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk and embedding record types.
//!
//! A chunk is a bounded span of normalised text with a stable content-derived
//! id; an embedding record pairs a chunk id with its vector under a named
//! model.  Both are persisted as JSONL, one object per line.

use crate::ModelDescriptor;
use crate::hash;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a chunk sits inside its source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkPosition {
    /// Start offset into the normalised document, in bytes.
    pub byte_start: usize,

    /// End offset (exclusive).
    pub byte_end: usize,

    /// Page number for paginated sources (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Nearest enclosing heading text, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    /// First line covered by the chunk (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<usize>,

    /// Last line covered by the chunk (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
}

/// Parent/child linkage for hierarchical chunking.
///
/// References are id-based; traversal uses in-memory lookup tables built on
/// load, never pointers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkHierarchy {
    /// Id of the parent chunk, when this chunk is a child.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Truncated snippet of the parent's text for context windows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<String>,

    /// Heading depth: 0 for flat chunks, 1..=6 for ATX heading levels.
    #[serde(default)]
    pub level: u8,
}

/// Descriptive metadata carried by every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkMetadata {
    /// MIME type of the originating blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// BCP-47 language tag, when detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Document title, when extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Tags inherited from the source record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Free-form key-value pairs (e.g. extractor confidence).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
}

/// A bounded span of normalised text: one line of `chunks.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    /// `sha256(doc_id:byte_start:byte_end)` — stable across runs.
    pub id: String,

    /// `sha256(raw source bytes)`.
    pub doc_id: String,

    /// Id of the source record this chunk came from.
    pub source_id: String,

    /// Ordinal of the chunk within its document.
    pub chunk_index: usize,

    /// The normalised text.
    pub text: String,

    /// SHA-256 of `text`, for integrity checks.
    pub text_sha256: String,

    /// `text.chars().count()`.
    pub char_count: usize,

    /// Approximate token count (`chars / 4`).
    pub token_count: usize,

    /// Byte range and optional page/heading/line coordinates.
    pub position: ChunkPosition,

    /// Parent/child linkage.
    #[serde(default, skip_serializing_if = "is_default_hierarchy")]
    pub hierarchy: ChunkHierarchy,

    /// Descriptive metadata.
    #[serde(default, skip_serializing_if = "is_default_metadata")]
    pub metadata: ChunkMetadata,
}

fn is_default_hierarchy(h: &ChunkHierarchy) -> bool {
    *h == ChunkHierarchy::default()
}

fn is_default_metadata(m: &ChunkMetadata) -> bool {
    *m == ChunkMetadata::default()
}

impl Chunk {
    /// Build a chunk over `text`, deriving id, hashes, and counts.
    pub fn new(
        doc_id: impl Into<String>,
        source_id: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
        position: ChunkPosition,
    ) -> Self {
        let doc_id = doc_id.into();
        let text = text.into();
        let id = hash::chunk_id(&doc_id, position.byte_start, position.byte_end);
        let text_sha256 = hash::sha256_hex(text.as_bytes());
        let char_count = text.chars().count();
        Self {
            id,
            doc_id,
            source_id: source_id.into(),
            chunk_index,
            text,
            text_sha256,
            char_count,
            token_count: approx_tokens(char_count),
            position,
            hierarchy: ChunkHierarchy::default(),
            metadata: ChunkMetadata::default(),
        }
    }
}

/// The chars-over-four token estimate used for quota and cost accounting.
pub fn approx_tokens(char_count: usize) -> usize {
    char_count.div_ceil(4)
}

/// One embedding: a line of `vectors.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddingRecord {
    /// The chunk this vector represents.
    pub chunk_id: String,

    /// Fixed-dimension vector; `len()` is constant per project.
    pub vector: Vec<f32>,

    /// The model that produced the vector.
    pub model: ModelDescriptor,

    /// When the vector was produced.
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Pair a chunk id with its vector under `model`, stamped now.
    pub fn new(chunk_id: impl Into<String>, vector: Vec<f32>, model: ModelDescriptor) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            vector,
            model,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk::new(
            hash::doc_id(b"the quick brown fox"),
            "src_test",
            0,
            "the quick brown fox",
            ChunkPosition {
                byte_start: 0,
                byte_end: 19,
                ..ChunkPosition::default()
            },
        )
    }

    #[test]
    fn chunk_id_is_stable() {
        let a = sample_chunk();
        let b = sample_chunk();
        assert_eq!(a.id, b.id);
        assert_eq!(a.text_sha256, b.text_sha256);
    }

    #[test]
    fn chunk_counts() {
        let c = sample_chunk();
        assert_eq!(c.char_count, 19);
        assert_eq!(c.token_count, 5);
    }

    #[test]
    fn approx_tokens_rounds_up() {
        assert_eq!(approx_tokens(0), 0);
        assert_eq!(approx_tokens(1), 1);
        assert_eq!(approx_tokens(4), 1);
        assert_eq!(approx_tokens(5), 2);
    }

    #[test]
    fn chunk_roundtrip_omits_empty_sections() {
        let c = sample_chunk();
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("hierarchy").is_none());
        assert!(json.get("metadata").is_none());

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn chunk_roundtrip_preserves_hierarchy() {
        let mut c = sample_chunk();
        c.hierarchy.parent_id = Some("deadbeef".into());
        c.hierarchy.level = 2;
        let json = serde_json::to_string(&c).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hierarchy.parent_id.as_deref(), Some("deadbeef"));
        assert_eq!(back.hierarchy.level, 2);
    }

    #[test]
    fn embedding_record_roundtrip() {
        let rec = EmbeddingRecord::new("abc123", vec![0.1, 0.2, 0.3], ModelDescriptor::mock(3));
        let json = serde_json::to_string(&rec).unwrap();
        let back: EmbeddingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chunk_id, "abc123");
        assert_eq!(back.vector.len(), 3);
        assert_eq!(back.model.provider, "mock");
    }
}
