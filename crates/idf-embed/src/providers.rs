// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedding provider implementations.
//!
//! [`OpenAiCompatProvider`] speaks the `/embeddings` wire shape most hosted
//! providers expose.  [`MockProvider`] is a deterministic hash embedder for
//! tests and offline builds: the same text always maps to the same unit
//! vector, with no network and no credentials.

use crate::{EmbeddingProvider, IndexedEmbedding, ProviderError, l2_normalize};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Deterministic hash-based embedder.
///
/// Vectors are derived from SHA-256 of the input text through a xorshift
/// expansion, then L2-normalised.  Not semantically meaningful, but stable
/// across runs and platforms, which is what the pipeline tests need.
#[derive(Debug, Clone)]
pub struct MockProvider {
    dimension: usize,
}

impl MockProvider {
    /// Mock provider producing `dimension`-wide vectors.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// The fixed output dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut state = u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"));
        // Never seed xorshift with zero.
        if state == 0 {
            state = 0x9e37_79b9_7f4a_7c15;
        }
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // Map to [-1, 1].
            let unit = (state >> 11) as f32 / (1u64 << 53) as f32;
            vector.push(unit * 2.0 - 1.0);
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, ProviderError> {
        Ok(texts
            .iter()
            .enumerate()
            .map(|(index, text)| IndexedEmbedding {
                index,
                vector: self.vector_for(text),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

#[derive(Deserialize)]
struct EmbeddingsDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP provider for the widely-implemented `POST /embeddings` shape.
///
/// The API key is read from the environment at construction and held only
/// for the lifetime of the provider; it never appears in any persisted
/// artifact.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Provider against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Read the API key from `env_var` now; absent keys surface later as
    /// `MISSING_API_KEY` through the client constructor.
    #[must_use]
    pub fn with_key_from_env(mut self, env_var: &str) -> Self {
        self.api_key = std::env::var(env_var).ok().filter(|v| !v.is_empty());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, ProviderError> {
        let mut request = self.client.post(self.endpoint()).json(&EmbeddingsRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ProviderError {
            message: format!("transport failure: {e}"),
            status: None,
            transport: true,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError {
                message: format!("embeddings endpoint returned {status}: {body}"),
                status: Some(status.as_u16()),
                transport: false,
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| ProviderError {
            message: format!("malformed embeddings response: {e}"),
            status: None,
            transport: false,
        })?;

        Ok(parsed
            .data
            .into_iter()
            .map(|d| IndexedEmbedding {
                index: d.index,
                vector: d.embedding,
            })
            .collect())
    }
}
