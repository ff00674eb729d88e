// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-build
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The orchestration engine.
pub mod engine;

pub use engine::{BuildEngine, resolve_provider};

use idf_core::BuildManifest;
use idf_error::ErrorDto;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Orchestrator version pinned into phase manifests.
pub const BUILD_TOOL_VERSION: &str = concat!("idf-build/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when the invocation deadline expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStrategy {
    /// Abandon the in-flight source (rolled back to pending) and return.
    Skip,
    /// Persist a checkpoint and return; the in-flight source rolls back to
    /// pending unless it already finished.
    #[default]
    Checkpoint,
    /// Like checkpoint, additionally recommending a smaller working set in
    /// the returned metrics.
    Split,
}

/// Per-invocation build options.  Out-of-range values are clamped by
/// [`BuildOptions::normalized`], not rejected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildOptions {
    /// Rebuild completed sources from scratch.
    #[serde(default)]
    pub force: bool,

    /// Plan only; no side effects.
    #[serde(default)]
    pub dry_run: bool,

    /// Working-set cap per invocation (`1..=50`).
    pub max_sources_per_build: usize,

    /// Fetch worker pool width (`1..=10`).
    pub fetch_concurrency: usize,

    /// Embedding batch size (`10..=100`).
    pub embedding_batch_size: usize,

    /// Write a checkpoint after every terminal source transition.
    pub enable_checkpointing: bool,

    /// Invocation deadline in milliseconds (`60_000..=1_800_000`).
    pub build_timeout_ms: u64,

    /// Deadline behaviour.
    #[serde(default)]
    pub timeout_strategy: TimeoutStrategy,

    /// Subtract a compatible checkpoint's completed sources from the plan.
    #[serde(default)]
    pub resume_from_checkpoint: bool,

    /// Expected checkpoint id; a mismatch ignores the checkpoint and notes
    /// it in the outcome's errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            max_sources_per_build: 10,
            fetch_concurrency: 3,
            embedding_batch_size: 50,
            enable_checkpointing: true,
            build_timeout_ms: 300_000,
            timeout_strategy: TimeoutStrategy::Checkpoint,
            resume_from_checkpoint: false,
            checkpoint_id: None,
        }
    }
}

impl BuildOptions {
    /// Clamp every bounded field into its documented range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_sources_per_build = self.max_sources_per_build.clamp(1, 50);
        self.fetch_concurrency = self.fetch_concurrency.clamp(1, 10);
        self.embedding_batch_size = self.embedding_batch_size.clamp(10, 100);
        self.build_timeout_ms = self.build_timeout_ms.clamp(60_000, 1_800_000);
        self
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Where the invocation left the project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BuildProgress {
    /// Sources registered on the project.
    pub total_sources: usize,
    /// Sources this invocation drove to a terminal state.
    pub processed_this_run: usize,
    /// Sources still pending after this invocation.
    pub remaining: usize,
    /// `true` when another invocation is needed.
    pub has_more: bool,
    /// The live checkpoint, when one remains on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

/// Wall-clock and cost accounting for the invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BuildMetrics {
    /// Total invocation time.
    pub duration_ms: u64,
    /// Fetch wave time.
    pub fetch_time_ms: u64,
    /// Extraction plus chunking time.
    pub chunk_time_ms: u64,
    /// Embedding plus upsert time.
    pub embed_time_ms: u64,
    /// Approximate tokens consumed (`chars / 4`), checkpoint-seeded.
    pub tokens_used: u64,
    /// Estimated spend against the pinned price table.
    pub estimated_cost_usd: f64,
    /// Suggested `max_sources_per_build` from the split timeout strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_max_sources: Option<usize>,
}

/// Result of one build invocation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildOutcome {
    /// `false` only when the invocation made no progress at all.
    pub success: bool,
    /// Manifest status (`completed`, `partial`, `failed`).
    pub status: idf_core::BuildStatus,
    /// Chunks appended this invocation.
    pub chunks_added: u64,
    /// Vectors appended this invocation.
    pub vectors_added: u64,
    /// Per-source and advisory errors absorbed along the way.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDto>,
    /// Where the project stands.
    pub progress: BuildProgress,
    /// Timing and cost accounting.
    pub metrics: BuildMetrics,
    /// Sources a dry run would process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned_sources: Vec<String>,
    /// The phase-level audit record.
    pub manifest: BuildManifest,
}
