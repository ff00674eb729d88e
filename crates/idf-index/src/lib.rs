// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-index
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Metadata filter predicates and retrieval profiles.
pub mod filter;
/// Append-only JSONL primitives shared by the logs.
pub mod jsonl;
/// The in-memory hybrid retriever.
pub mod retriever;
/// Chunk/vector log writer and the sidecar manifest.
pub mod writer;

pub use filter::{FilterOp, FilterPredicate, RetrievalProfile};
pub use retriever::{
    DEFAULT_ALPHA, ExpandMode, ExpandOptions, FusionStrategy, MAX_TOP_K, RRF_K, ResolvedMode,
    Retriever, RetrieverStats, SearchHit, SearchMode, SearchQuery, SearchResponse, cosine,
};
pub use writer::{IndexWriter, VectorManifest};
