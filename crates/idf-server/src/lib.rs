// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-server
#![deny(unsafe_code)]

/// Process-scoped registry of running search servers.
pub mod registry;

pub use registry::ServerRegistry;

use axum::extract::{Path as AxPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use idf_core::SourceRecord;
use idf_embed::EmbeddingProvider;
use idf_error::{ErrorCode, ErrorDto, FoundryError};
use idf_index::{Retriever, SearchMode, SearchQuery};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Shared state behind every route.
pub struct AppState {
    /// The served project's slug.
    pub project_id: String,
    /// Snapshot retriever over the project's logs.
    pub retriever: Retriever,
    /// Source ledger snapshot for `GET /sources`.
    pub sources: Vec<SourceRecord>,
    /// Query embedder, when the project's provider is constructible here.
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
    /// Searches served since start.
    pub searches_served: AtomicU64,
}

/// JSON error body mirroring the foundry error wire shape.
#[derive(Debug)]
pub struct ApiError(pub ErrorDto);

impl From<FoundryError> for ApiError {
    fn from(err: FoundryError) -> Self {
        Self((&err).into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code {
            ErrorCode::ProjectNotFound | ErrorCode::RunNotFound | ErrorCode::NoSource => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::InvalidInput | ErrorCode::InvalidFilter => StatusCode::BAD_REQUEST,
            ErrorCode::AlreadyRunning => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0 }))).into_response()
    }
}

/// Build the Axum router with all search routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/stats", get(cmd_stats))
        .route("/search", post(cmd_search))
        .route("/chunks/{chunk_id}", get(cmd_get_chunk))
        .route("/sources", get(cmd_sources))
        .route("/documents/{doc_id}", get(cmd_get_document))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn cmd_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "project": state.project_id,
        "format_version": idf_core::FORMAT_VERSION,
        "time": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.retriever.stats();
    Json(json!({
        "project": state.project_id,
        "chunks": stats.chunks,
        "vectors": stats.vectors,
        "documents": stats.documents,
        "sources": state.sources.len(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "searches_served": state.searches_served.load(Ordering::Relaxed),
    }))
}

async fn cmd_search(
    State(state): State<Arc<AppState>>,
    Json(mut query): Json<SearchQuery>,
) -> Result<Json<idf_index::SearchResponse>, ApiError> {
    // Server-side query embedding: only when the mode wants a vector, none
    // was supplied, and the project's provider is available here.  Otherwise
    // the retriever reports keyword_fallback.
    if query.vector.is_none()
        && !matches!(query.mode, SearchMode::Keyword)
        && !query.text.trim().is_empty()
    {
        if let Some(ref embedder) = state.embedder {
            let batch = [query.text.clone()];
            if let Ok(mut embeddings) = embedder.embed_batch(&batch).await {
                if let Some(first) = embeddings.pop() {
                    query.vector = Some(first.vector);
                }
            }
        }
    }

    let response = state.retriever.search(&query)?;
    state.searches_served.fetch_add(1, Ordering::Relaxed);
    Ok(Json(response))
}

async fn cmd_get_chunk(
    State(state): State<Arc<AppState>>,
    AxPath(chunk_id): AxPath<String>,
) -> Result<Json<idf_core::Chunk>, ApiError> {
    state
        .retriever
        .chunk(&chunk_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            FoundryError::new(ErrorCode::NoSource, format!("no chunk {chunk_id:?}"))
                .with_detail("chunk_id", chunk_id)
                .into()
        })
}

async fn cmd_sources(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sources.clone())
}

async fn cmd_get_document(
    State(state): State<Arc<AppState>>,
    AxPath(doc_id): AxPath<String>,
) -> Result<Json<Vec<idf_core::Chunk>>, ApiError> {
    let chunks: Vec<idf_core::Chunk> = state
        .retriever
        .document(&doc_id)
        .into_iter()
        .cloned()
        .collect();
    if chunks.is_empty() {
        return Err(FoundryError::new(
            ErrorCode::NoSource,
            format!("no document {doc_id:?}"),
        )
        .with_detail("doc_id", doc_id)
        .into());
    }
    Ok(Json(chunks))
}

/// Hydrate an [`AppState`] for `project_id` from its on-disk logs.
///
/// The retriever snapshots the logs at this moment; a build appending later
/// is not observed until the server restarts.
///
/// # Errors
///
/// `PROJECT_NOT_FOUND` or `DB_ERROR`.
pub fn hydrate(
    store: &idf_workspace::ProjectStore,
    project_id: &str,
) -> Result<AppState, FoundryError> {
    let project = store.load_project(project_id)?;
    let paths = store.paths(project_id);
    let retriever = Retriever::load(&paths.data_dir)?;
    let sources = store.read_sources(project_id)?;
    // A provider that cannot be constructed (e.g. missing key) just means
    // keyword fallback for vectorless queries.
    let embedder = idf_build::resolve_provider(&project.model).ok();

    let stats = retriever.stats();
    info!(
        target: "idf.server",
        project = project_id,
        chunks = stats.chunks,
        vectors = stats.vectors,
        "search state hydrated"
    );

    Ok(AppState {
        project_id: project_id.to_string(),
        retriever,
        sources,
        embedder,
        started_at: Instant::now(),
        searches_served: AtomicU64::new(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use idf_core::{ChunkConfig, ModelDescriptor, SourceKind};
    use idf_workspace::{ProjectManager, Workspace};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// A tiny project with one source and a chunk/vector pair on disk.
    fn seeded_state() -> (TempDir, Arc<AppState>) {
        use idf_core::{Chunk, ChunkPosition, EmbeddingRecord, hash};
        use idf_index::IndexWriter;

        let dir = TempDir::new().unwrap();
        let manager = ProjectManager::new(Workspace::under(dir.path()));
        manager
            .create_project("docs", ModelDescriptor::mock(4), ChunkConfig::default())
            .unwrap();
        manager
            .add_source(
                "docs",
                SourceRecord::new(SourceKind::Folder, "./somewhere", "local"),
            )
            .unwrap();

        let writer = IndexWriter::new(manager.store().paths("docs").data_dir);
        let doc = hash::doc_id(b"seeded");
        let mut chunks = Vec::new();
        for (i, text) in ["alpha words here", "beta words here"].iter().enumerate() {
            chunks.push(Chunk::new(
                doc.clone(),
                "src_seed",
                i,
                *text,
                ChunkPosition {
                    byte_start: i * 50,
                    byte_end: i * 50 + text.len(),
                    ..ChunkPosition::default()
                },
            ));
        }
        writer.append_chunks(&chunks).unwrap();
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                EmbeddingRecord::new(
                    c.id.as_str(),
                    vec![i as f32, 1.0, 0.0, 0.0],
                    ModelDescriptor::mock(4),
                )
            })
            .collect();
        writer.append_vectors(&records, "docs").unwrap();

        let state = hydrate(manager.store(), "docs").unwrap();
        (dir, Arc::new(state))
    }

    #[tokio::test]
    async fn health_reports_project() {
        let (_dir, state) = seeded_state();
        let app = build_app(state);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["project"], "docs");
        assert_eq!(body["format_version"], idf_core::FORMAT_VERSION);
    }

    #[tokio::test]
    async fn stats_report_index_sizes() {
        let (_dir, state) = seeded_state();
        let app = build_app(state);
        let response = app
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["chunks"], 2);
        assert_eq!(body["vectors"], 2);
        assert_eq!(body["documents"], 1);
        assert_eq!(body["sources"], 1);
    }

    #[tokio::test]
    async fn keyword_search_roundtrip() {
        let (_dir, state) = seeded_state();
        let app = build_app(state.clone());
        let request = Request::post("/search")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"text": "alpha", "mode": "keyword"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mode"], "keyword");
        assert_eq!(body["hits"].as_array().unwrap().len(), 1);
        assert!(body["hits"][0]["chunk"]["text"]
            .as_str()
            .unwrap()
            .contains("alpha"));
        assert_eq!(state.searches_served.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn hybrid_search_embeds_server_side() {
        let (_dir, state) = seeded_state();
        assert!(state.embedder.is_some(), "mock provider resolvable");
        let app = build_app(state);
        let request = Request::post("/search")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"text": "alpha words", "mode": "hybrid"}).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = body_json(response).await;
        // The server embedded the query, so no keyword fallback.
        assert_eq!(body["mode"], "hybrid");
    }

    #[tokio::test]
    async fn invalid_filter_maps_to_bad_request() {
        let (_dir, state) = seeded_state();
        let app = build_app(state);
        let request = Request::post("/search")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "text": "alpha",
                    "mode": "keyword",
                    "filter": [{"field": "undeclared", "op": "eq", "value": 1}]
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_FILTER");
    }

    #[tokio::test]
    async fn chunk_and_document_lookup() {
        let (_dir, state) = seeded_state();
        let doc_id = state.retriever.document_ids()[0].clone();
        let chunk_id = state.retriever.document(&doc_id)[0].id.clone();
        let app = build_app(state);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/chunks/{chunk_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/documents/{doc_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let indices: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["chunk_index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1]);

        let response = app
            .oneshot(Request::get("/chunks/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
