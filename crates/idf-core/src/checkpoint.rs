// SPDX-License-Identifier: MIT OR Apache-2.0
//! Checkpoint records for resumable builds.
//!
//! A checkpoint is a durable snapshot of build progress: the set of sources
//! already completed plus the aggregate stats accumulated so far.  It is a
//! valid prefix of the full build — resuming from it and completing the
//! remaining work yields the same final manifest as one uninterrupted build.

use crate::new_checkpoint_id;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Aggregate stats carried across resume boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointStats {
    /// Chunks appended so far.
    pub chunks_added: u64,
    /// Vectors appended so far.
    pub vectors_added: u64,
    /// Approximate tokens consumed so far.
    pub tokens_used: u64,
    /// Wall-clock milliseconds spent so far.
    pub duration_ms: u64,
}

impl CheckpointStats {
    /// Fold another stats block into this one.
    pub fn absorb(&mut self, other: &CheckpointStats) {
        self.chunks_added += other.chunks_added;
        self.vectors_added += other.vectors_added;
        self.tokens_used += other.tokens_used;
        self.duration_ms += other.duration_ms;
    }
}

/// Marker for a source that was mid-flight when the checkpoint was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InProgressSource {
    /// The source that was being processed.
    pub source_id: String,
    /// Chunks already appended for this source.
    pub chunks_done: u64,
}

/// A durable snapshot of build progress: `checkpoints/latest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Checkpoint {
    /// Opaque time-ordered id (`ckpt_` prefix).
    pub id: String,

    /// Owning project slug.
    pub project_id: String,

    /// When the checkpoint was written.
    pub created_at: DateTime<Utc>,

    /// Sources fully processed before this checkpoint.
    pub completed_source_ids: BTreeSet<String>,

    /// Source that was mid-flight, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<InProgressSource>,

    /// Aggregate stats accumulated so far.
    #[serde(default)]
    pub stats: CheckpointStats,
}

impl Checkpoint {
    /// Open an empty checkpoint for `project_id`.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            id: new_checkpoint_id(),
            project_id: project_id.into(),
            created_at: Utc::now(),
            completed_source_ids: BTreeSet::new(),
            in_progress: None,
            stats: CheckpointStats::default(),
        }
    }

    /// Record a completed source, refreshing id and timestamp so archives
    /// stay time-ordered.
    pub fn advance(&mut self, source_id: impl Into<String>, delta: &CheckpointStats) {
        self.completed_source_ids.insert(source_id.into());
        self.in_progress = None;
        self.stats.absorb(delta);
        self.id = new_checkpoint_id();
        self.created_at = Utc::now();
    }
}
