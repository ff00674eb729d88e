// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory hybrid retriever.
//!
//! Hydrated from the chunk and vector logs at load time (a snapshot: bytes
//! appended later are never observed), the retriever serves semantic cosine
//! search, length-normalised keyword search, and fused hybrid ranking, with
//! conjunctive metadata filters and context expansion over the parent/child
//! chunk graph.  The scoring loop holds no locks and never suspends.

use crate::filter::{self, FilterPredicate, RetrievalProfile};
use crate::writer::IndexWriter;
use idf_core::{Chunk, EmbeddingRecord};
use idf_error::{ErrorCode, FoundryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// The Reciprocal-Rank-Fusion constant.  Mandated: exactly 60.
pub const RRF_K: f32 = 60.0;

/// Default semantic weight in hybrid fusion.
pub const DEFAULT_ALPHA: f32 = 0.7;

/// Upper bound on `top_k`.
pub const MAX_TOP_K: usize = 100;

/// How many candidates each side of a hybrid query contributes.
const CANDIDATE_FACTOR: usize = 3;

// ---------------------------------------------------------------------------
// Query & response types
// ---------------------------------------------------------------------------

/// Requested search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Cosine similarity over stored vectors.
    Semantic,
    /// Term-frequency keyword scoring.
    Keyword,
    /// Fused semantic + keyword ranking.
    #[default]
    Hybrid,
}

/// The mode a response was actually served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedMode {
    /// Served as requested: semantic.
    Semantic,
    /// Served as requested: keyword.
    Keyword,
    /// Served as requested: hybrid.
    Hybrid,
    /// Semantic/hybrid was requested but no query vector was available.
    KeywordFallback,
}

/// Score fusion strategy for hybrid mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Reciprocal Rank Fusion with `K = 60`.
    #[default]
    Rrf,
    /// `alpha * semantic + (1 - alpha) * keyword` over the raw scores.
    ///
    /// The two inputs are on different scales (unnormalised cosine vs
    /// length-normalised term frequency) and are fused as-is, with no
    /// per-list normalisation.  Prefer RRF when scale-free fusion matters.
    WeightedSum,
}

/// Which neighbours context expansion pulls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpandMode {
    /// Chunks of the same document adjacent by `chunk_index`.
    Adjacent,
    /// The `parent_id` chunk, one level up.
    Parent,
    /// Union of adjacent and parent.
    Both,
}

/// Context-expansion options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpandOptions {
    /// Neighbour selection.
    pub mode: ExpandMode,
    /// Adjacent chunks to include before each hit.
    pub adjacent_before: usize,
    /// Adjacent chunks to include after each hit.
    pub adjacent_after: usize,
    /// Cap on the total result set (hits plus neighbours).
    pub max_total_chunks: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            mode: ExpandMode::Both,
            adjacent_before: 1,
            adjacent_after: 1,
            max_total_chunks: 20,
        }
    }
}

/// A search request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchQuery {
    /// Query text (keyword side; also what callers embed for the vector).
    pub text: String,
    /// Pre-computed query vector for semantic/hybrid modes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Requested mode.
    #[serde(default)]
    pub mode: SearchMode,
    /// Results to return (`1..=100`).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Semantic weight for hybrid fusion.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Fusion strategy for hybrid mode.
    #[serde(default)]
    pub fusion: FusionStrategy,
    /// Conjunctive metadata filter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<FilterPredicate>,
    /// Context expansion, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<ExpandOptions>,
}

fn default_top_k() -> usize {
    10
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

impl SearchQuery {
    /// A hybrid query with defaults.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vector: None,
            mode: SearchMode::Hybrid,
            top_k: default_top_k(),
            alpha: DEFAULT_ALPHA,
            fusion: FusionStrategy::Rrf,
            filter: Vec::new(),
            expand: None,
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    /// The matched (or expansion-neighbour) chunk.
    pub chunk: Chunk,
    /// Mode-specific score; 0 for expansion neighbours.
    pub score: f32,
    /// Set when this entry was pulled in by context expansion, naming the
    /// originating hit's chunk id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded_from: Option<String>,
}

/// A ranked response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    /// The mode actually served.
    pub mode: ResolvedMode,
    /// Hits in rank order; expansion neighbours follow their originator.
    pub hits: Vec<SearchHit>,
}

/// Index size summary for the stats surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct RetrieverStats {
    /// Chunks loaded.
    pub chunks: usize,
    /// Vectors loaded.
    pub vectors: usize,
    /// Distinct documents.
    pub documents: usize,
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// Read-only in-memory index over a snapshot of the chunk and vector logs.
pub struct Retriever {
    chunks: Vec<Chunk>,
    by_id: HashMap<String, usize>,
    by_doc: HashMap<String, Vec<usize>>,
    vectors: HashMap<String, Vec<f32>>,
    profile: RetrievalProfile,
}

impl Retriever {
    /// Hydrate from `<project>/data`, snapshotting both logs.
    ///
    /// # Errors
    ///
    /// `DB_ERROR` when a log exists but cannot be read.
    pub fn load(data_dir: &Path) -> Result<Self, FoundryError> {
        let writer = IndexWriter::new(data_dir);
        let chunks = writer.read_chunks()?;
        let vectors = writer.read_vectors()?;
        debug!(
            target: "idf.retrieval",
            chunks = chunks.len(),
            vectors = vectors.len(),
            "retriever hydrated"
        );
        Ok(Self::from_parts(chunks, vectors))
    }

    /// Build directly from records (tests, embedded callers).
    pub fn from_parts(chunks: Vec<Chunk>, records: Vec<EmbeddingRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(chunks.len());
        let mut by_doc: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            by_id.insert(chunk.id.clone(), i);
            by_doc.entry(chunk.doc_id.clone()).or_default().push(i);
        }
        for indices in by_doc.values_mut() {
            indices.sort_by_key(|&i| chunks[i].chunk_index);
        }
        let vectors = records
            .into_iter()
            .map(|r| (r.chunk_id, r.vector))
            .collect();
        Self {
            chunks,
            by_id,
            by_doc,
            vectors,
            profile: RetrievalProfile::standard(),
        }
    }

    /// Replace the retrieval profile.
    #[must_use]
    pub fn with_profile(mut self, profile: RetrievalProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Index size summary.
    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            chunks: self.chunks.len(),
            vectors: self.vectors.len(),
            documents: self.by_doc.len(),
        }
    }

    /// Look up one chunk by id.
    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    /// Sorted ids of every document in the snapshot.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_doc.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All chunks of a document, sorted by `chunk_index`.
    pub fn document(&self, doc_id: &str) -> Vec<&Chunk> {
        self.by_doc
            .get(doc_id)
            .map(|indices| indices.iter().map(|&i| &self.chunks[i]).collect())
            .unwrap_or_default()
    }

    /// Execute a query.
    ///
    /// # Errors
    ///
    /// `INVALID_INPUT` for an out-of-range `top_k`; `INVALID_FILTER` for a
    /// predicate outside the retrieval profile.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResponse, FoundryError> {
        if query.top_k == 0 || query.top_k > MAX_TOP_K {
            return Err(FoundryError::new(
                ErrorCode::InvalidInput,
                format!("top_k must be in 1..={MAX_TOP_K}, got {}", query.top_k),
            ));
        }
        self.profile.validate(&query.filter)?;

        let filtered: Vec<usize> = (0..self.chunks.len())
            .filter(|&i| filter::matches(&self.chunks[i], &query.filter))
            .collect();

        let (mode, ranked) = match query.mode {
            SearchMode::Keyword => (
                ResolvedMode::Keyword,
                self.keyword_rank(&filtered, &query.text, query.top_k),
            ),
            SearchMode::Semantic => match query.vector {
                Some(ref vector) => (
                    ResolvedMode::Semantic,
                    self.semantic_rank(&filtered, vector, query.top_k),
                ),
                None => (
                    ResolvedMode::KeywordFallback,
                    self.keyword_rank(&filtered, &query.text, query.top_k),
                ),
            },
            SearchMode::Hybrid => match query.vector {
                Some(ref vector) => {
                    let cap = query.top_k.saturating_mul(CANDIDATE_FACTOR);
                    let semantic = self.semantic_rank(&filtered, vector, cap);
                    let keyword = self.keyword_rank(&filtered, &query.text, cap);
                    let fused = self.fuse(query, &semantic, &keyword);
                    (ResolvedMode::Hybrid, fused)
                }
                None => (
                    ResolvedMode::KeywordFallback,
                    self.keyword_rank(&filtered, &query.text, query.top_k),
                ),
            },
        };

        let mut hits: Vec<SearchHit> = ranked
            .into_iter()
            .take(query.top_k)
            .map(|(index, score)| SearchHit {
                chunk: self.chunks[index].clone(),
                score,
                expanded_from: None,
            })
            .collect();

        if let Some(ref options) = query.expand {
            hits = self.expand(hits, options);
        }

        Ok(SearchResponse { mode, hits })
    }

    // -- Scoring -------------------------------------------------------------

    /// Cosine top-`cap` over the filtered candidates carrying vectors.
    fn semantic_rank(&self, filtered: &[usize], vector: &[f32], cap: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = filtered
            .iter()
            .filter_map(|&i| {
                self.vectors
                    .get(&self.chunks[i].id)
                    .map(|v| (i, cosine(vector, v)))
            })
            .collect();
        self.sort_ranked(&mut scored);
        scored.truncate(cap);
        scored
    }

    /// Term-frequency top-`cap`: lowercase whitespace tokens of length >= 3,
    /// score `sum(matches) / sqrt(text chars)`.
    fn keyword_rank(&self, filtered: &[usize], text: &str, cap: usize) -> Vec<(usize, f32)> {
        let terms: Vec<String> = text
            .split_whitespace()
            .filter(|t| t.chars().count() >= 3)
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = filtered
            .iter()
            .filter_map(|&i| {
                let chunk = &self.chunks[i];
                let haystack = chunk.text.to_lowercase();
                let matches: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                if matches == 0 {
                    return None;
                }
                let score = matches as f32 / (chunk.char_count.max(1) as f32).sqrt();
                Some((i, score))
            })
            .collect();
        self.sort_ranked(&mut scored);
        scored.truncate(cap);
        scored
    }

    /// Fuse the two candidate lists per the query's strategy.
    fn fuse(
        &self,
        query: &SearchQuery,
        semantic: &[(usize, f32)],
        keyword: &[(usize, f32)],
    ) -> Vec<(usize, f32)> {
        let alpha = query.alpha.clamp(0.0, 1.0);
        let mut fused: HashMap<usize, f32> = HashMap::new();

        match query.fusion {
            FusionStrategy::Rrf => {
                for (rank, &(index, _)) in semantic.iter().enumerate() {
                    *fused.entry(index).or_insert(0.0) += alpha / (RRF_K + rank as f32 + 1.0);
                }
                for (rank, &(index, _)) in keyword.iter().enumerate() {
                    *fused.entry(index).or_insert(0.0) +=
                        (1.0 - alpha) / (RRF_K + rank as f32 + 1.0);
                }
            }
            FusionStrategy::WeightedSum => {
                // Raw-scale fusion; see the FusionStrategy doc for the caveat.
                for &(index, score) in semantic {
                    *fused.entry(index).or_insert(0.0) += alpha * score;
                }
                for &(index, score) in keyword {
                    *fused.entry(index).or_insert(0.0) += (1.0 - alpha) * score;
                }
            }
        }

        let mut ranked: Vec<(usize, f32)> = fused.into_iter().collect();
        self.sort_ranked(&mut ranked);
        ranked
    }

    /// Descending score, stable chunk-id tie-break.
    fn sort_ranked(&self, ranked: &mut [(usize, f32)]) {
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.chunks[a.0].id.cmp(&self.chunks[b.0].id))
        });
    }

    // -- Expansion -----------------------------------------------------------

    /// Pull in neighbours for each hit, preserving hit order and appending
    /// neighbours immediately after their originator.  Original hits always
    /// survive; `max_total_chunks` bounds what expansion may add on top.
    fn expand(&self, hits: Vec<SearchHit>, options: &ExpandOptions) -> Vec<SearchHit> {
        let mut seen: HashSet<String> = hits.iter().map(|h| h.chunk.id.clone()).collect();
        let mut budget = options.max_total_chunks.saturating_sub(hits.len());
        let mut out = Vec::with_capacity(hits.len() + budget);

        for hit in hits {
            let origin_id = hit.chunk.id.clone();
            let neighbours = self.neighbours(&hit.chunk, options);
            out.push(hit);
            for index in neighbours {
                if budget == 0 {
                    break;
                }
                let chunk = &self.chunks[index];
                if !seen.insert(chunk.id.clone()) {
                    continue;
                }
                budget -= 1;
                out.push(SearchHit {
                    chunk: chunk.clone(),
                    score: 0.0,
                    expanded_from: Some(origin_id.clone()),
                });
            }
        }
        out
    }

    fn neighbours(&self, chunk: &Chunk, options: &ExpandOptions) -> Vec<usize> {
        let mut result = Vec::new();
        if matches!(options.mode, ExpandMode::Adjacent | ExpandMode::Both) {
            if let Some(doc_indices) = self.by_doc.get(&chunk.doc_id) {
                let lo = chunk.chunk_index.saturating_sub(options.adjacent_before);
                let hi = chunk.chunk_index + options.adjacent_after;
                for &i in doc_indices {
                    let idx = self.chunks[i].chunk_index;
                    if idx >= lo && idx <= hi && self.chunks[i].id != chunk.id {
                        result.push(i);
                    }
                }
            }
        }
        if matches!(options.mode, ExpandMode::Parent | ExpandMode::Both) {
            if let Some(parent_id) = chunk.hierarchy.parent_id.as_deref() {
                if let Some(&i) = self.by_id.get(parent_id) {
                    result.push(i);
                }
            }
        }
        result
    }
}

/// Cosine similarity; 0 when either vector has zero norm or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use idf_core::{ChunkPosition, ModelDescriptor, hash};
    use serde_json::json;

    /// Build a corpus where each chunk has a controlled unit vector.
    fn corpus() -> (Vec<Chunk>, Vec<EmbeddingRecord>) {
        let doc = hash::doc_id(b"corpus");
        let texts = [
            "Shadow Demons lurk near the ceiling of the Chamber of Binding",
            "attack attack attack from every direction at once",
            "the lighting rig hangs from above the stage",
            "a quiet paragraph about gardening and soil quality",
            "fiends and other creatures of the night are catalogued here",
        ];
        let vectors = [
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.70710677, 0.70710677, 0.0],
            vec![0.9486833, 0.31622776, 0.0],
        ];
        let mut chunks = Vec::new();
        let mut records = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let mut chunk = Chunk::new(
                doc.clone(),
                "src_corpus",
                i,
                *text,
                ChunkPosition {
                    byte_start: i * 100,
                    byte_end: i * 100 + text.len(),
                    ..ChunkPosition::default()
                },
            );
            chunk.metadata.tags = vec![if i % 2 == 0 { "even" } else { "odd" }.to_string()];
            records.push(EmbeddingRecord::new(
                &chunk.id,
                vectors[i].clone(),
                ModelDescriptor::mock(3),
            ));
            chunks.push(chunk);
        }
        (chunks, records)
    }

    fn retriever() -> Retriever {
        let (chunks, records) = corpus();
        Retriever::from_parts(chunks, records)
    }

    fn semantic(vector: Vec<f32>, top_k: usize) -> SearchQuery {
        SearchQuery {
            mode: SearchMode::Semantic,
            vector: Some(vector),
            top_k,
            ..SearchQuery::new("")
        }
    }

    // -- Lookup -----------------------------------------------------------

    #[test]
    fn chunk_and_document_lookup() {
        let r = retriever();
        let (chunks, _) = corpus();
        assert!(r.chunk(&chunks[2].id).is_some());
        assert!(r.chunk("missing").is_none());

        let doc = r.document(&chunks[0].doc_id);
        assert_eq!(doc.len(), 5);
        let indices: Vec<_> = doc.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn stats_report_sizes() {
        let stats = retriever().stats();
        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.vectors, 5);
        assert_eq!(stats.documents, 1);
    }

    // -- Semantic ----------------------------------------------------------

    #[test]
    fn semantic_orders_by_cosine() {
        let r = retriever();
        let response = r.search(&semantic(vec![1.0, 0.0, 0.0], 3)).unwrap();
        assert_eq!(response.mode, ResolvedMode::Semantic);
        // Chunk 0 is exactly the query direction; chunk 4 is closest after.
        assert!(response.hits[0].chunk.text.starts_with("Shadow Demons"));
        assert!(response.hits[1].chunk.text.starts_with("fiends"));
        assert!(response.hits[0].score > response.hits[1].score);
    }

    #[test]
    fn semantic_without_vector_falls_back_to_keyword() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Semantic,
            vector: None,
            ..SearchQuery::new("gardening soil")
        };
        let response = r.search(&query).unwrap();
        assert_eq!(response.mode, ResolvedMode::KeywordFallback);
        assert!(response.hits[0].chunk.text.contains("gardening"));
    }

    // -- Keyword -----------------------------------------------------------

    #[test]
    fn keyword_counts_and_normalises_by_length() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 5,
            ..SearchQuery::new("attack")
        };
        let response = r.search(&query).unwrap();
        assert_eq!(response.mode, ResolvedMode::Keyword);
        assert_eq!(response.hits.len(), 1);
        let hit = &response.hits[0];
        let expected = 3.0 / (hit.chunk.char_count as f32).sqrt();
        assert!((hit.score - expected).abs() < 1e-6);
    }

    #[test]
    fn keyword_drops_short_tokens_and_ignores_case() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 5,
            // "of" and "is" are under 3 chars and must not match everything.
            ..SearchQuery::new("of is SHADOW")
        };
        let response = r.search(&query).unwrap();
        assert_eq!(response.hits.len(), 1);
        assert!(response.hits[0].chunk.text.contains("Shadow"));
    }

    #[test]
    fn keyword_with_no_usable_terms_is_empty() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Keyword,
            ..SearchQuery::new("a of is")
        };
        assert!(r.search(&query).unwrap().hits.is_empty());
    }

    // -- Hybrid ------------------------------------------------------------

    #[test]
    fn rrf_constant_is_sixty() {
        assert_eq!(RRF_K, 60.0);
    }

    #[test]
    fn hybrid_alpha_one_equals_semantic() {
        let r = retriever();
        let vector = vec![0.2, 0.9, 0.1];

        let sem_ids: Vec<String> = r
            .search(&semantic(vector.clone(), 5))
            .unwrap()
            .hits
            .iter()
            .map(|h| h.chunk.id.clone())
            .collect();

        let hybrid = SearchQuery {
            mode: SearchMode::Hybrid,
            vector: Some(vector),
            alpha: 1.0,
            top_k: 5,
            ..SearchQuery::new("attack ceiling")
        };
        let hy_ids: Vec<String> = r
            .search(&hybrid)
            .unwrap()
            .hits
            .iter()
            .map(|h| h.chunk.id.clone())
            .collect();

        assert_eq!(hy_ids[..sem_ids.len().min(hy_ids.len())], sem_ids[..]);
    }

    #[test]
    fn hybrid_alpha_zero_equals_keyword() {
        let r = retriever();
        let keyword = SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 5,
            ..SearchQuery::new("ceiling chamber")
        };
        let kw_ids: Vec<String> = r
            .search(&keyword)
            .unwrap()
            .hits
            .iter()
            .map(|h| h.chunk.id.clone())
            .collect();

        let hybrid = SearchQuery {
            mode: SearchMode::Hybrid,
            vector: Some(vec![0.0, 0.0, 1.0]),
            alpha: 0.0,
            top_k: 5,
            ..SearchQuery::new("ceiling chamber")
        };
        let hy_ids: Vec<String> = r
            .search(&hybrid)
            .unwrap()
            .hits
            .iter()
            .filter(|h| h.score > 0.0)
            .map(|h| h.chunk.id.clone())
            .collect();

        assert_eq!(hy_ids[..kw_ids.len()], kw_ids[..]);
    }

    #[test]
    fn hybrid_rrf_score_shape() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Hybrid,
            vector: Some(vec![1.0, 0.0, 0.0]),
            alpha: 0.7,
            top_k: 5,
            ..SearchQuery::new("shadow demons")
        };
        let response = r.search(&query).unwrap();
        // Chunk 0 is rank 1 on both sides: 0.7/61 + 0.3/61.
        let expected = 0.7 / 61.0 + 0.3 / 61.0;
        assert!((response.hits[0].score - expected).abs() < 1e-6);
        assert!(response.hits[0].chunk.text.starts_with("Shadow Demons"));
    }

    #[test]
    fn hybrid_surfaces_paraphrase_match() {
        // Keyword alone cannot rank the Shadow Demons chunk for this query
        // (no shared terms); the vector side must carry it into the top 2.
        // The decoys share query terms but sit far from the query vector, so
        // they fall outside the 3*top_k semantic candidate list.
        let doc = hash::doc_id(b"paraphrase");
        let mut chunks = Vec::new();
        let mut records = Vec::new();
        let mut push = |i: usize, text: &str, vector: Vec<f32>| {
            let chunk = Chunk::new(
                doc.clone(),
                "src_p",
                i,
                text,
                ChunkPosition {
                    byte_start: i * 100,
                    byte_end: i * 100 + text.len(),
                    ..ChunkPosition::default()
                },
            );
            records.push(EmbeddingRecord::new(
                &chunk.id,
                vector,
                ModelDescriptor::mock(3),
            ));
            chunks.push(chunk);
        };

        push(
            0,
            "Shadow Demons lurk near the ceiling of the Chamber of Binding",
            vec![1.0, 0.0, 0.0],
        );
        for i in 1..=6 {
            // Cosine ignores magnitude, so these stay unnormalised.
            let lean = 0.4 + i as f32 * 0.05;
            push(i, &format!("neutral filler text item {i}"), vec![lean, 1.0, 0.0]);
        }
        push(7, "attack attack attack from above with fiends", vec![-1.0, 0.0, 0.0]);
        push(8, "more fiends attack from above in this passage", vec![0.0, -1.0, 0.0]);

        let r = Retriever::from_parts(chunks, records);
        let query_text = "fiends that attack from above";

        let keyword_only = SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 5,
            ..SearchQuery::new(query_text)
        };
        let kw = r.search(&keyword_only).unwrap();
        assert!(
            kw.hits
                .iter()
                .take(3)
                .all(|h| !h.chunk.text.starts_with("Shadow Demons")),
        );

        let hybrid = SearchQuery {
            mode: SearchMode::Hybrid,
            vector: Some(vec![1.0, 0.05, 0.0]),
            top_k: 2,
            ..SearchQuery::new(query_text)
        };
        let hy = r.search(&hybrid).unwrap();
        assert!(
            hy.hits
                .iter()
                .take(2)
                .any(|h| h.chunk.text.starts_with("Shadow Demons")),
        );
    }

    #[test]
    fn hybrid_without_vector_reports_fallback() {
        let r = retriever();
        let response = r.search(&SearchQuery::new("gardening soil")).unwrap();
        assert_eq!(response.mode, ResolvedMode::KeywordFallback);
    }

    #[test]
    fn weighted_sum_uses_raw_scores() {
        let r = retriever();
        let query = SearchQuery {
            mode: SearchMode::Hybrid,
            vector: Some(vec![1.0, 0.0, 0.0]),
            fusion: FusionStrategy::WeightedSum,
            alpha: 1.0,
            top_k: 1,
            ..SearchQuery::new("")
        };
        let response = r.search(&query).unwrap();
        // alpha=1 weighted sum degenerates to raw cosine.
        assert!((response.hits[0].score - 1.0).abs() < 1e-6);
    }

    // -- Filters -----------------------------------------------------------

    #[test]
    fn filtered_search_equals_prefiltered_corpus() {
        let (chunks, records) = corpus();
        let full = Retriever::from_parts(chunks.clone(), records.clone());

        let predicate = FilterPredicate {
            field: "tags".into(),
            op: FilterOp::Contains,
            value: json!("even"),
        };
        let query = SearchQuery {
            mode: SearchMode::Semantic,
            vector: Some(vec![0.5, 0.5, 0.5]),
            filter: vec![predicate],
            top_k: 5,
            ..SearchQuery::new("")
        };
        let filtered_ids: Vec<String> = full
            .search(&query)
            .unwrap()
            .hits
            .iter()
            .map(|h| h.chunk.id.clone())
            .collect();

        // Same mode over a corpus pre-filtered to the "even" chunks.
        let pre: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| c.metadata.tags.contains(&"even".to_string()))
            .collect();
        let pre_ids: HashSet<String> = pre.iter().map(|c| c.id.clone()).collect();
        let pre_records: Vec<EmbeddingRecord> = records
            .into_iter()
            .filter(|r| pre_ids.contains(&r.chunk_id))
            .collect();
        let reduced = Retriever::from_parts(pre, pre_records);
        let mut no_filter = query.clone();
        no_filter.filter.clear();
        let reduced_ids: Vec<String> = reduced
            .search(&no_filter)
            .unwrap()
            .hits
            .iter()
            .map(|h| h.chunk.id.clone())
            .collect();

        assert_eq!(filtered_ids, reduced_ids);
    }

    #[test]
    fn undeclared_filter_rejected() {
        let r = retriever();
        let query = SearchQuery {
            filter: vec![FilterPredicate {
                field: "nope".into(),
                op: FilterOp::Eq,
                value: json!(1),
            }],
            ..SearchQuery::new("anything")
        };
        assert_eq!(
            r.search(&query).unwrap_err().code,
            ErrorCode::InvalidFilter
        );
    }

    // -- Validation ---------------------------------------------------------

    #[test]
    fn top_k_bounds_enforced() {
        let r = retriever();
        for top_k in [0usize, 101] {
            let query = SearchQuery {
                top_k,
                ..SearchQuery::new("x")
            };
            assert_eq!(
                r.search(&query).unwrap_err().code,
                ErrorCode::InvalidInput,
                "top_k {top_k}"
            );
        }
    }

    // -- Expansion -----------------------------------------------------------

    fn hierarchical_corpus() -> (Vec<Chunk>, Vec<EmbeddingRecord>) {
        let doc = hash::doc_id(b"hier");
        let mut chunks = Vec::new();
        let mut parent = Chunk::new(
            doc.clone(),
            "src_h",
            0,
            "# Section about demons",
            ChunkPosition {
                byte_start: 0,
                byte_end: 22,
                ..ChunkPosition::default()
            },
        );
        parent.hierarchy.level = 1;
        let parent_id = parent.id.clone();
        chunks.push(parent);

        for (i, name) in ["one", "two", "three", "four"].iter().enumerate() {
            let index = i + 1;
            let text = format!("child paragraph {name} about demons");
            let mut child = Chunk::new(
                doc.clone(),
                "src_h",
                index,
                text.clone(),
                ChunkPosition {
                    byte_start: index * 100,
                    byte_end: index * 100 + text.len(),
                    ..ChunkPosition::default()
                },
            );
            child.hierarchy.parent_id = Some(parent_id.clone());
            chunks.push(child);
        }
        (chunks, Vec::new())
    }

    fn expand_query(text: &str, mode: ExpandMode, max_total: usize) -> SearchQuery {
        SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 1,
            expand: Some(ExpandOptions {
                mode,
                adjacent_before: 1,
                adjacent_after: 1,
                max_total_chunks: max_total,
            }),
            ..SearchQuery::new(text)
        }
    }

    #[test]
    fn adjacent_expansion_pulls_neighbours() {
        let (chunks, records) = hierarchical_corpus();
        let r = Retriever::from_parts(chunks, records);
        let response = r
            .search(&expand_query("two", ExpandMode::Adjacent, 10))
            .unwrap();

        // The top hit plus its chunk_index +/- 1 neighbours.
        assert_eq!(response.hits.len(), 3);
        assert!(response.hits[0].expanded_from.is_none());
        let origin = response.hits[0].chunk.id.clone();
        for neighbour in &response.hits[1..] {
            assert_eq!(neighbour.expanded_from.as_deref(), Some(origin.as_str()));
            let diff = neighbour
                .chunk
                .chunk_index
                .abs_diff(response.hits[0].chunk.chunk_index);
            assert_eq!(diff, 1);
        }
    }

    #[test]
    fn parent_expansion_follows_parent_id() {
        let (chunks, records) = hierarchical_corpus();
        let r = Retriever::from_parts(chunks, records);
        let response = r
            .search(&expand_query("two", ExpandMode::Parent, 10))
            .unwrap();
        assert_eq!(response.hits.len(), 2);
        assert!(response.hits[1].chunk.text.starts_with("# Section"));
    }

    #[test]
    fn expansion_respects_total_cap() {
        let (chunks, records) = hierarchical_corpus();
        let r = Retriever::from_parts(chunks, records);
        let response = r
            .search(&expand_query("two", ExpandMode::Both, 2))
            .unwrap();
        assert_eq!(response.hits.len(), 2);
    }

    #[test]
    fn expansion_never_duplicates() {
        let (chunks, records) = hierarchical_corpus();
        let r = Retriever::from_parts(chunks, records);
        let query = SearchQuery {
            mode: SearchMode::Keyword,
            top_k: 4,
            expand: Some(ExpandOptions {
                mode: ExpandMode::Both,
                adjacent_before: 2,
                adjacent_after: 2,
                max_total_chunks: 50,
            }),
            ..SearchQuery::new("demons")
        };
        let response = r.search(&query).unwrap();
        let mut ids = HashSet::new();
        for hit in &response.hits {
            assert!(ids.insert(hit.chunk.id.clone()), "duplicate {}", hit.chunk.id);
        }
    }

    // -- Cosine ---------------------------------------------------------------

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
