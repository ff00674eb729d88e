// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-embed
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Provider implementations (OpenAI-compatible HTTP, deterministic mock).
pub mod providers;

pub use providers::{MockProvider, OpenAiCompatProvider};

use async_trait::async_trait;
use idf_core::chunk::approx_tokens;
use idf_core::{Chunk, EmbeddingRecord, ModelDescriptor};
use idf_error::{ErrorCode, FoundryError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Embedder version pinned into phase manifests.
pub const EMBEDDER_VERSION: &str = concat!("idf-embed/", env!("CARGO_PKG_VERSION"));

/// Pinned USD price per 1 000 tokens for known embedding models.
///
/// Models absent from this table cost 0 and produce a warning.
pub const PRICE_PER_1K_TOKENS: &[(&str, f64)] = &[
    ("mock-hash", 0.0),
    ("text-embedding-3-small", 0.000_02),
    ("text-embedding-3-large", 0.000_13),
    ("text-embedding-ada-002", 0.000_10),
    ("voyage-2", 0.000_10),
    ("embed-english-v3.0", 0.000_10),
];

/// USD price per token for `model_name`, if the model is in the pinned table.
pub fn price_per_token(model_name: &str) -> Option<f64> {
    PRICE_PER_1K_TOKENS
        .iter()
        .find(|(name, _)| *name == model_name)
        .map(|(_, per_1k)| per_1k / 1000.0)
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// One vector keyed by its position in the request batch.
///
/// Providers may reply out of order; the client re-sorts on `index` so the
/// emitted records always follow the input chunk order.
#[derive(Debug, Clone)]
pub struct IndexedEmbedding {
    /// Position of the embedded text within the request batch.
    pub index: usize,
    /// The produced vector.
    pub vector: Vec<f32>,
}

/// Error surfaced by an embedding provider call.
#[derive(Debug)]
pub struct ProviderError {
    /// Human-readable description.
    pub message: String,
    /// HTTP status, when the failure had one.
    pub status: Option<u16>,
    /// `true` for connect/transport-level failures.
    pub transport: bool,
}

impl ProviderError {
    /// Transient failures (transport, 5xx, 408, 429) are worth retrying.
    pub fn is_recoverable(&self) -> bool {
        self.transport
            || matches!(self.status, Some(s) if s >= 500 || s == 408 || s == 429)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// An external vector producer.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier (matches `ModelDescriptor::provider`).
    fn name(&self) -> &str;

    /// Whether the provider needs an API key from the environment.
    fn requires_api_key(&self) -> bool {
        true
    }

    /// Embed one batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Exponential-backoff retry settings for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Output of an embedding pass over a chunk stream.
#[derive(Debug, Default)]
pub struct EmbedOutput {
    /// Records in input chunk order.
    pub records: Vec<EmbeddingRecord>,
    /// Chunks skipped because they were already embedded.
    pub skipped: usize,
    /// Approximate tokens consumed (`chars / 4`).
    pub tokens_used: u64,
    /// Estimated spend against the pinned price table.
    pub estimated_cost_usd: f64,
    /// Non-fatal notes (e.g. unknown model price).
    pub warnings: Vec<String>,
}

/// Batched embedding driver.
///
/// Batches preserve chunk order, one outstanding provider call at a time so
/// the vector log order is deterministic.
pub struct EmbedClient {
    provider: Arc<dyn EmbeddingProvider>,
    model: ModelDescriptor,
    batch_size: usize,
    normalize: bool,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EmbedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedClient")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("normalize", &self.normalize)
            .field("retry", &self.retry)
            .finish()
    }
}

impl EmbedClient {
    /// Build a client, verifying the API-key environment variable when the
    /// provider requires one.
    ///
    /// # Errors
    ///
    /// `MISSING_API_KEY` (non-recoverable) when `model.api_key_env` names an
    /// unset or empty variable.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        model: ModelDescriptor,
    ) -> Result<Self, FoundryError> {
        if provider.requires_api_key() {
            let var = model.api_key_env.as_str();
            let present = !var.is_empty()
                && std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false);
            if !present {
                return Err(FoundryError::new(
                    ErrorCode::MissingApiKey,
                    format!("environment variable {var:?} is unset or empty"),
                )
                .with_detail("api_key_env", var)
                .with_suggestion("export the provider API key before building"));
            }
        }
        Ok(Self {
            provider,
            model,
            batch_size: 50,
            normalize: false,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the batch size (clamped to `10..=100`).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(10, 100);
        self
    }

    /// Enable L2 normalisation of produced vectors.
    #[must_use]
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The model descriptor this client embeds under.
    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Embed `chunks`, skipping ids present in `existing` unless `force`.
    ///
    /// Records come back in input order even when the provider replies out
    /// of order.  The vector dimension is pinned by the model descriptor or,
    /// failing that, by the first batch; any later deviation aborts.
    ///
    /// # Errors
    ///
    /// `EMBED_PROVIDER_ERROR` after retry exhaustion (recoverable flag set
    /// from the final provider failure); `DIMENSION_MISMATCH` on an
    /// inconsistent batch (non-recoverable).
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        existing: &HashSet<String>,
        force: bool,
    ) -> Result<EmbedOutput, FoundryError> {
        let mut output = EmbedOutput::default();

        let pending: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| {
                let keep = force || !existing.contains(&c.id);
                if !keep {
                    output.skipped += 1;
                }
                keep
            })
            .collect();

        if pending.is_empty() {
            return Ok(output);
        }

        let price = price_per_token(&self.model.model_name);
        if price.is_none() {
            output.warnings.push(format!(
                "no pinned price for model {:?}; estimated cost reported as 0",
                self.model.model_name
            ));
        }

        let mut expected_dimension = self.model.dimension;

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let mut embeddings = self.call_with_retry(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(FoundryError::new(
                    ErrorCode::EmbedProviderError,
                    format!(
                        "provider returned {} vectors for a batch of {}",
                        embeddings.len(),
                        batch.len()
                    ),
                )
                .recoverable(false));
            }
            // Stable output order even for out-of-order provider replies.
            embeddings.sort_by_key(|e| e.index);

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let mut vector = embedding.vector;
                match expected_dimension {
                    None => expected_dimension = Some(vector.len()),
                    Some(dim) if dim != vector.len() => {
                        return Err(FoundryError::new(
                            ErrorCode::DimensionMismatch,
                            format!("expected {dim}-dim vectors, batch returned {}", vector.len()),
                        )
                        .with_detail("expected", dim)
                        .with_detail("actual", vector.len()));
                    }
                    Some(_) => {}
                }
                if self.normalize {
                    l2_normalize(&mut vector);
                }

                let tokens = approx_tokens(chunk.char_count) as u64;
                output.tokens_used += tokens;
                if let Some(per_token) = price {
                    output.estimated_cost_usd += tokens as f64 * per_token;
                }
                output
                    .records
                    .push(EmbeddingRecord::new(chunk.id.as_str(), vector, self.model.clone()));
            }
            debug!(
                target: "idf.embed",
                provider = self.provider.name(),
                batch = batch.len(),
                total = output.records.len(),
                "embedded batch"
            );
        }

        Ok(output)
    }

    async fn call_with_retry(
        &self,
        texts: &[String],
    ) -> Result<Vec<IndexedEmbedding>, FoundryError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) if err.is_recoverable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        target: "idf.embed",
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let recoverable = err.is_recoverable();
                    return Err(FoundryError::new(
                        ErrorCode::EmbedProviderError,
                        format!("provider {} failed: {err}", self.provider.name()),
                    )
                    .recoverable(recoverable)
                    .with_detail("attempts", attempt + 1)
                    .with_source(err));
                }
            }
        }
    }
}

/// Scale `vector` to unit L2 norm (no-op for the zero vector).
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
