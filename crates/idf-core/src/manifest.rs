// SPDX-License-Identifier: MIT OR Apache-2.0
//! Build and phase manifests.
//!
//! A manifest is the audit record of a build: when it ran, what configuration
//! it was pinned to, what each phase consumed and produced, and the errors it
//! absorbed along the way.

use chrono::{DateTime, Utc};
use idf_error::ErrorDto;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall outcome of a build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// The invocation is still executing.
    Running,
    /// Every source in the working set completed.
    Completed,
    /// The invocation aborted with no progress.
    Failed,
    /// Some sources completed, some failed or remain pending.
    Partial,
}

impl BuildStatus {
    /// Returns `true` for terminal states.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Audit record for one pipeline phase (fetch, chunk, embed, upsert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PhaseManifest {
    /// Phase name (`"fetch"`, `"chunk"`, `"embed"`, `"upsert"`).
    pub phase: String,

    /// When the phase started.
    pub started_at: DateTime<Utc>,

    /// When the phase finished; absent while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Items consumed.
    pub input_count: u64,

    /// Items produced.
    pub output_count: u64,

    /// Version of the tool/decoder pinned for reproducibility.
    pub tool_version: String,

    /// Errors absorbed during the phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDto>,
}

impl PhaseManifest {
    /// Open a phase record stamped now.
    pub fn start(phase: impl Into<String>, tool_version: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            started_at: Utc::now(),
            completed_at: None,
            input_count: 0,
            output_count: 0,
            tool_version: tool_version.into(),
            errors: Vec::new(),
        }
    }

    /// Close the phase record.
    pub fn finish(&mut self, input_count: u64, output_count: u64) {
        self.input_count = input_count;
        self.output_count = output_count;
        self.completed_at = Some(Utc::now());
    }
}

/// Aggregate totals across all phases of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BuildTotals {
    /// Sources fetched (including skipped-as-cached).
    pub sources_fetched: u64,
    /// Chunks appended to the chunk log.
    pub chunks_created: u64,
    /// Embedding records appended to the vector log.
    pub vectors_indexed: u64,
    /// Errors recorded across all phases.
    pub errors: u64,
}

/// The audit record of one build: persisted into the project directory and
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BuildManifest {
    /// When the build was created.
    pub created_at: DateTime<Utc>,

    /// When the build reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Overall outcome.
    pub status: BuildStatus,

    /// SHA-256 of the frozen project configuration this build ran under.
    pub config_sha256: String,

    /// Per-phase audit records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseManifest>,

    /// Aggregate totals.
    #[serde(default)]
    pub totals: BuildTotals,

    /// Wall-clock milliseconds per phase name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timings_ms: BTreeMap<String, u64>,
}

impl BuildManifest {
    /// Open a running manifest pinned to `config_sha256`.
    pub fn start(config_sha256: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            completed_at: None,
            status: BuildStatus::Running,
            config_sha256: config_sha256.into(),
            phases: Vec::new(),
            totals: BuildTotals::default(),
            timings_ms: BTreeMap::new(),
        }
    }

    /// Close the manifest with a terminal status.
    pub fn finish(&mut self, status: BuildStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(!BuildStatus::Running.is_terminal());
        assert!(BuildStatus::Completed.is_terminal());
        assert!(BuildStatus::Failed.is_terminal());
        assert!(BuildStatus::Partial.is_terminal());
    }

    #[test]
    fn phase_lifecycle() {
        let mut phase = PhaseManifest::start("fetch", "idf-fetch/0.1.0");
        assert!(phase.completed_at.is_none());
        phase.finish(5, 4);
        assert_eq!(phase.input_count, 5);
        assert_eq!(phase.output_count, 4);
        assert!(phase.completed_at.is_some());
    }

    #[test]
    fn manifest_lifecycle_roundtrip() {
        let mut m = BuildManifest::start("cafe".repeat(16));
        m.totals.chunks_created = 12;
        m.timings_ms.insert("fetch".into(), 310);
        m.finish(BuildStatus::Partial);

        let json = serde_json::to_string(&m).unwrap();
        let back: BuildManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.status, BuildStatus::Partial);
        assert_eq!(back.timings_ms["fetch"], 310);
    }

    #[test]
    fn empty_sections_omitted() {
        let m = BuildManifest::start("00".repeat(32));
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("phases").is_none());
        assert!(json.get("timings_ms").is_none());
        assert!(json.get("completed_at").is_none());
    }
}
