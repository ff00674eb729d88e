// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable data model for Index Foundry.
//!
//! If you only take one dependency, take this one.

/// Checkpoint records for resumable builds.
pub mod checkpoint;
/// Chunk, position, hierarchy, and embedding record types.
pub mod chunk;
/// Content-address hashing helpers (SHA-256, lowercase hex).
pub mod hash;
/// Build and phase manifests.
pub mod manifest;

pub use checkpoint::{Checkpoint, CheckpointStats, InProgressSource};
pub use chunk::{Chunk, ChunkHierarchy, ChunkMetadata, ChunkPosition, EmbeddingRecord};
pub use manifest::{BuildManifest, BuildStatus, BuildTotals, PhaseManifest};

use chrono::{DateTime, Utc};
use idf_error::{ErrorCode, FoundryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current on-disk format version embedded in project manifests.
///
/// # Examples
///
/// ```
/// assert_eq!(idf_core::FORMAT_VERSION, "foundry/v1");
/// ```
pub const FORMAT_VERSION: &str = "foundry/v1";

/// Maximum length of a project slug.
pub const MAX_PROJECT_ID_LEN: usize = 64;

/// Validate a project slug: `^[a-z0-9][a-z0-9-]*$`, at most
/// [`MAX_PROJECT_ID_LEN`] characters.
///
/// # Errors
///
/// Returns `INVALID_INPUT` describing the first violated rule.
pub fn validate_project_id(id: &str) -> Result<(), FoundryError> {
    if id.is_empty() {
        return Err(FoundryError::new(
            ErrorCode::InvalidInput,
            "project id must not be empty",
        ));
    }
    if id.len() > MAX_PROJECT_ID_LEN {
        return Err(FoundryError::new(
            ErrorCode::InvalidInput,
            format!("project id exceeds {MAX_PROJECT_ID_LEN} characters"),
        )
        .with_detail("id", id));
    }
    let mut chars = id.chars();
    let first = chars.next().expect("non-empty");
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return Err(FoundryError::new(
            ErrorCode::InvalidInput,
            "project id must start with a lowercase letter or digit",
        )
        .with_detail("id", id));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(FoundryError::new(
            ErrorCode::InvalidInput,
            format!("project id contains invalid character {bad:?}"),
        )
        .with_detail("id", id)
        .with_suggestion("use only lowercase letters, digits, and dashes"));
    }
    Ok(())
}

/// Mint a time-ordered source id (`src_` + UUIDv7).
pub fn new_source_id() -> String {
    format!("src_{}", Uuid::now_v7())
}

/// Mint a time-ordered checkpoint id (`ckpt_` + UUIDv7).
pub fn new_checkpoint_id() -> String {
    format!("ckpt_{}", Uuid::now_v7())
}

// ---------------------------------------------------------------------------
// Embedding model descriptor
// ---------------------------------------------------------------------------

/// Names the embedding provider and model a project is pinned to.
///
/// `api_key_env` names the environment variable holding the provider
/// credential; the descriptor never holds the secret itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelDescriptor {
    /// Provider identifier (e.g. `"openai"`, `"mock"`).
    pub provider: String,

    /// Model name as the provider spells it.
    pub model_name: String,

    /// Expected vector dimension; pinned after the first successful batch
    /// when absent.
    pub dimension: Option<usize>,

    /// Environment variable naming the API key.
    pub api_key_env: String,
}

impl ModelDescriptor {
    /// Descriptor for the deterministic in-process mock provider.
    pub fn mock(dimension: usize) -> Self {
        Self {
            provider: "mock".into(),
            model_name: "mock-hash".into(),
            dimension: Some(dimension),
            api_key_env: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chunking configuration
// ---------------------------------------------------------------------------

/// Text-splitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Non-overlapping windows of exactly `max_chars`.
    Fixed,
    /// Split on blank lines, merging short fragments.
    Paragraph,
    /// Split on ATX markdown headings.
    Heading,
    /// Split on page boundaries (paginated extractors only).
    Page,
    /// Split on sentence terminators.
    Sentence,
    /// Walk a separator hierarchy, packing greedily.
    Recursive,
    /// Heading-scoped parent chunks plus recursively split children.
    Hierarchical,
}

/// Deterministic chunker configuration.
///
/// A chunk stream is a pure function of `(text, config)`; two identical
/// configs always yield identical chunk ids over the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkConfig {
    /// Splitting strategy.
    pub strategy: ChunkStrategy,

    /// Hard upper bound on chunk length in characters.
    pub max_chars: usize,

    /// Fragments shorter than this merge into their predecessor.
    pub min_chars: usize,

    /// Suffix of the previous chunk prepended to the next one.
    pub overlap_chars: usize,

    /// Separator hierarchy for the recursive strategy, coarsest first.
    pub separators: Vec<String>,

    /// Length of the parent snippet carried by hierarchical children.
    pub parent_context_chars: usize,

    /// Emit one parent chunk per heading in hierarchical mode.
    pub create_parent_chunks: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Recursive,
            max_chars: 1000,
            min_chars: 80,
            overlap_chars: 100,
            separators: default_separators(),
            parent_context_chars: 200,
            create_parent_chunks: true,
        }
    }
}

/// The default recursive separator hierarchy.
pub fn default_separators() -> Vec<String> {
    vec!["\n\n".into(), "\n".into(), ". ".into(), " ".into()]
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// The kind of input a source names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A single web page.
    Url,
    /// A sitemap XML whose `<loc>` entries fan out into page fetches.
    Sitemap,
    /// A local directory walked with include/exclude globs.
    Folder,
    /// A PDF by URL or local path.
    Pdf,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Url => "url",
            Self::Sitemap => "sitemap",
            Self::Folder => "folder",
            Self::Pdf => "pdf",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a source within the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Not yet picked up by a build.
    Pending,
    /// Bytes are being retrieved.
    Fetching,
    /// Text is being extracted and split.
    Chunking,
    /// Vectors are being produced.
    Embedding,
    /// Fully indexed.
    Completed,
    /// Terminal failure; `last_error` holds the reason.
    Failed,
}

impl SourceStatus {
    /// Returns `true` if this status represents a resting state.
    ///
    /// A build always leaves every source in a resting state; the transient
    /// states are only observable while an invocation is running.
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Pending | Self::Completed | Self::Failed)
    }

    /// Returns the set of statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [SourceStatus] {
        match self {
            Self::Pending => &[Self::Fetching, Self::Failed],
            Self::Fetching => &[Self::Chunking, Self::Failed, Self::Pending],
            Self::Chunking => &[Self::Embedding, Self::Failed, Self::Pending],
            Self::Embedding => &[Self::Completed, Self::Failed, Self::Pending],
            Self::Completed => &[Self::Pending],
            Self::Failed => &[Self::Pending, Self::Fetching],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: SourceStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Per-source fetch options.
///
/// All fields are optional; absent fields fall back to fetcher defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceOptions {
    /// Hostname allowlist shared by all fetches for this source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_domains: Vec<String>,

    /// Include patterns (regexes for sitemaps, globs for folders).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Exclude patterns, applied after includes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Cap on sitemap pages or folder files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,

    /// Sitemap fan-out width (1..=10).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-file byte cap for folder sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_bytes: Option<u64>,
}

/// A registered input: one line of `sources.jsonl`.
///
/// Identity is immutable; only `status`, `last_error`, and `chunk_count`
/// change across builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceRecord {
    /// Opaque time-ordered id (`src_` prefix).
    pub id: String,

    /// What kind of input this is.
    pub kind: SourceKind,

    /// Source-specific URI (URL, sitemap URL, directory path, PDF location).
    pub uri: String,

    /// Human-readable display name.
    pub name: String,

    /// Free-form tags copied into chunk metadata.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Fetch options.
    #[serde(default, skip_serializing_if = "is_default_options")]
    pub options: SourceOptions,

    /// When the source was registered.
    pub added_at: DateTime<Utc>,

    /// Current pipeline state.
    pub status: SourceStatus,

    /// Failure reason when `status == failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Chunks produced by the most recent successful processing.
    #[serde(default)]
    pub chunk_count: u64,
}

fn is_default_options(opts: &SourceOptions) -> bool {
    *opts == SourceOptions::default()
}

impl SourceRecord {
    /// Register a new pending source.
    pub fn new(kind: SourceKind, uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_source_id(),
            kind,
            uri: uri.into(),
            name: name.into(),
            tags: Vec::new(),
            options: SourceOptions::default(),
            added_at: Utc::now(),
            status: SourceStatus::Pending,
            last_error: None,
            chunk_count: 0,
        }
    }

    /// Builder-style tag attachment.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builder-style options attachment.
    #[must_use]
    pub fn with_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Aggregate statistics maintained across builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectStats {
    /// Registered sources.
    pub total_sources: u64,
    /// Lines in the chunk log.
    pub total_chunks: u64,
    /// Lines in the vector log.
    pub total_vectors: u64,
    /// Errors accumulated across builds.
    pub total_errors: u64,
    /// Completion time of the most recent build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build_at: Option<DateTime<Utc>>,
}

/// A logical workspace: the root object persisted as `project.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    /// Slug identity (`^[a-z0-9][a-z0-9-]*$`).
    pub id: String,

    /// On-disk format version.
    pub format_version: String,

    /// Pinned embedding model.
    pub model: ModelDescriptor,

    /// Pinned chunking configuration.
    pub chunking: ChunkConfig,

    /// L2-normalise vectors before persisting.
    #[serde(default)]
    pub normalize_vectors: bool,

    /// SHA-256 of the frozen `(model, chunking)` configuration.
    pub config_sha256: String,

    /// Aggregate statistics.
    #[serde(default)]
    pub stats: ProjectStats,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a project with a validated slug and a frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` when the slug violates the identifier rules.
    pub fn new(
        id: impl Into<String>,
        model: ModelDescriptor,
        chunking: ChunkConfig,
    ) -> Result<Self, FoundryError> {
        let id = id.into();
        validate_project_id(&id)?;
        let config_sha256 = hash::config_sha256(&model, &chunking)?;
        let now = Utc::now();
        Ok(Self {
            id,
            format_version: FORMAT_VERSION.into(),
            model,
            chunking,
            normalize_vectors: false,
            config_sha256,
            stats: ProjectStats::default(),
            created_at: now,
            updated_at: now,
        })
    }
}
