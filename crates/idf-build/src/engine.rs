// SPDX-License-Identifier: MIT OR Apache-2.0
//! The build orchestration engine.
//!
//! One invocation drives a capped working set of sources through
//! fetch → extract → chunk → embed → upsert.  Fetches fan out over a bounded
//! worker pool consuming a work channel; everything downstream is serialised
//! per source so the vector log order matches the chunk log order and a
//! checkpoint is only written after a source's vectors are durable.
//!
//! Per-source errors mark that source `failed` and the invocation continues;
//! only `DIMENSION_MISMATCH`, `MISSING_API_KEY`, and checkpoint-write
//! failures abort the build.

use crate::{
    BUILD_TOOL_VERSION, BuildMetrics, BuildOptions, BuildOutcome, BuildProgress, TimeoutStrategy,
};
use idf_chunk::{CHUNKER_VERSION, Chunker};
use idf_core::{
    BuildManifest, BuildStatus, Checkpoint, CheckpointStats, Chunk, ModelDescriptor,
    PhaseManifest, SourceKind, SourceRecord, SourceStatus,
};
use idf_embed::{
    EMBEDDER_VERSION, EmbedClient, EmbeddingProvider, MockProvider, OpenAiCompatProvider,
};
use idf_error::{ErrorCode, ErrorDto, FoundryError};
use idf_extract::{ExtractorRegistry, FormatHint};
use idf_fetch::{
    BlobStore, FETCHER_VERSION, FetchFailure, Fetcher, FolderOptions, RawArtifact, SitemapOptions,
};
use idf_index::writer::IndexWriter;
use idf_workspace::{BuildLock, CheckpointStore, ProjectPaths, ProjectStore};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default base URL for the `openai` provider.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// What one source contributed to the invocation.
#[derive(Debug, Default, Clone, Copy)]
struct SourceDelta {
    chunks: u64,
    vectors: u64,
    tokens: u64,
    cost_usd: f64,
}

/// The build orchestrator.
pub struct BuildEngine {
    store: ProjectStore,
    registry: Arc<ExtractorRegistry>,
    provider_override: Option<Arc<dyn EmbeddingProvider>>,
}

impl BuildEngine {
    /// Engine over `store` with the default extractor registry.
    pub fn new(store: ProjectStore) -> Self {
        Self {
            store,
            registry: Arc::new(ExtractorRegistry::with_defaults()),
            provider_override: None,
        }
    }

    /// Replace the extractor registry (custom decoders).
    #[must_use]
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Force a specific embedding provider instead of resolving one from the
    /// project's model descriptor.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    /// Run one build invocation against `project_id`.
    ///
    /// # Errors
    ///
    /// `PROJECT_NOT_FOUND`, `NO_SOURCE`, `BUILD_FAILED(reason=locked)`, and
    /// the fatal build errors (`MISSING_API_KEY`, `DIMENSION_MISMATCH`,
    /// `CHECKPOINT_WRITE_FAILED`).  Per-source failures do not error the
    /// call; they are reported in the outcome.
    pub async fn build(
        &self,
        project_id: &str,
        options: BuildOptions,
    ) -> Result<BuildOutcome, FoundryError> {
        let options = options.normalized();
        let deadline = Instant::now() + Duration::from_millis(options.build_timeout_ms);
        self.build_with_deadline(project_id, options, deadline).await
    }

    /// [`BuildEngine::build`] with an explicit deadline (already-normalised
    /// options expected).  Exposed for deadline-injection in tests.
    pub async fn build_with_deadline(
        &self,
        project_id: &str,
        options: BuildOptions,
        deadline: Instant,
    ) -> Result<BuildOutcome, FoundryError> {
        let started = Instant::now();
        let project = self.store.load_project(project_id)?;
        let paths = self.store.paths(project_id);

        let all_sources = self.store.read_sources(project_id)?;
        if all_sources.is_empty() {
            return Err(FoundryError::new(
                ErrorCode::NoSource,
                format!("project {project_id:?} has no sources"),
            )
            .with_suggestion("add a source before building"));
        }

        // -- Plan -----------------------------------------------------------
        let eligible: Vec<SourceRecord> = all_sources
            .iter()
            .filter(|s| {
                options.force || matches!(s.status, SourceStatus::Pending | SourceStatus::Failed)
            })
            .cloned()
            .collect();
        let mut working: Vec<SourceRecord> = eligible
            .iter()
            .take(options.max_sources_per_build)
            .cloned()
            .collect();

        if options.dry_run {
            return Ok(dry_run_outcome(&project, &all_sources, &eligible, &working));
        }

        // At most one build per project.
        let _lock = BuildLock::acquire(&paths.lock_file)?;

        let mut errors: Vec<ErrorDto> = Vec::new();

        // -- Resume ---------------------------------------------------------
        let ckpt_store = CheckpointStore::at(&paths.checkpoints_dir);
        let mut checkpoint = Checkpoint::new(project_id);
        if options.resume_from_checkpoint {
            match ckpt_store.load_latest()? {
                Some(latest)
                    if options
                        .checkpoint_id
                        .as_ref()
                        .is_none_or(|want| *want == latest.id) =>
                {
                    working.retain(|s| !latest.completed_source_ids.contains(&s.id));
                    debug!(
                        target: "idf.build",
                        checkpoint = %latest.id,
                        completed = latest.completed_source_ids.len(),
                        "resuming from checkpoint"
                    );
                    checkpoint = latest;
                }
                Some(latest) => {
                    errors.push(
                        FoundryError::new(
                            ErrorCode::RunNotFound,
                            format!(
                                "checkpoint {:?} not found (latest is {:?}); starting fresh",
                                options.checkpoint_id.as_deref().unwrap_or(""),
                                latest.id
                            ),
                        )
                        .recoverable(true)
                        .into(),
                    );
                }
                None => {}
            }
        }
        let seeded = checkpoint.stats;

        // force=true resets completed members of the working set to pending.
        if options.force {
            for source in &working {
                if source.status == SourceStatus::Completed {
                    self.store.update_source(project_id, &source.id, |s| {
                        s.status = SourceStatus::Pending;
                        s.last_error = None;
                    })?;
                }
            }
        }

        // -- Shared machinery ----------------------------------------------
        let mut manifest = BuildManifest::start(project.config_sha256.as_str());
        let writer = IndexWriter::new(&paths.data_dir);
        let chunker = Chunker::new(project.chunking.clone())?;
        let provider = match &self.provider_override {
            Some(provider) => provider.clone(),
            None => resolve_provider(&project.model)?,
        };
        let client = EmbedClient::new(provider, project.model.clone())?
            .with_batch_size(options.embedding_batch_size)
            .with_normalization(project.normalize_vectors);
        let mut embedded_ids = writer.embedded_ids()?;

        // -- Fetch wave -----------------------------------------------------
        let mut fetch_phase = PhaseManifest::start("fetch", FETCHER_VERSION);
        let fetch_started = Instant::now();
        let mut fetched = self
            .fetch_wave(project_id, &paths, &working, &options)
            .await;
        let fetch_time_ms = fetch_started.elapsed().as_millis() as u64;
        let fetched_ok = fetched.values().filter(|r| r.is_ok()).count() as u64;
        fetch_phase.finish(working.len() as u64, fetched_ok);

        // -- Per-source chunk/embed/upsert ----------------------------------
        let mut extract_phase = PhaseManifest::start("extract", idf_extract::EXTRACTOR_VERSION);
        let mut chunk_phase = PhaseManifest::start("chunk", CHUNKER_VERSION);
        let mut embed_phase = PhaseManifest::start("embed", EMBEDDER_VERSION);
        let mut upsert_phase = PhaseManifest::start("upsert", BUILD_TOOL_VERSION);

        let mut decoder_tags: BTreeSet<String> = BTreeSet::new();
        let mut embed_warnings: BTreeSet<String> = BTreeSet::new();
        let mut totals = SourceDelta::default();
        let mut chunk_time = Duration::ZERO;
        let mut embed_time = Duration::ZERO;
        let mut processed = 0usize;
        let mut completed = 0usize;
        let mut timed_out = false;
        let mut last_mark = Instant::now();

        for source in &working {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let fetch_result = fetched
                .remove(&source.id)
                .unwrap_or_else(|| Err(FoundryError::new(ErrorCode::FetchFailed, "not fetched")));

            let (artifacts, fetch_failures) = match fetch_result {
                Ok(pair) => pair,
                Err(error) => {
                    self.mark_failed(project_id, source, &error)?;
                    errors.push((&error).into());
                    processed += 1;
                    self.save_checkpoint(&ckpt_store, &checkpoint, options.enable_checkpointing)?;
                    continue;
                }
            };
            for failure in &fetch_failures {
                errors.push((&failure.error).into());
            }

            let result = self
                .process_source(
                    project_id,
                    &project.id,
                    source,
                    &artifacts,
                    &chunker,
                    &client,
                    &writer,
                    &mut embedded_ids,
                    &mut decoder_tags,
                    &mut embed_warnings,
                    &options,
                    deadline,
                    &mut chunk_time,
                    &mut embed_time,
                )
                .await;

            match result {
                Ok(Some(delta)) => {
                    processed += 1;
                    completed += 1;
                    totals.chunks += delta.chunks;
                    totals.vectors += delta.vectors;
                    totals.tokens += delta.tokens;
                    totals.cost_usd += delta.cost_usd;
                    checkpoint.advance(
                        source.id.as_str(),
                        &CheckpointStats {
                            chunks_added: delta.chunks,
                            vectors_added: delta.vectors,
                            tokens_used: delta.tokens,
                            duration_ms: last_mark.elapsed().as_millis() as u64,
                        },
                    );
                    last_mark = Instant::now();
                    self.save_checkpoint(&ckpt_store, &checkpoint, options.enable_checkpointing)?;
                }
                Ok(None) => {
                    // Deadline hit mid-source under the skip strategy; the
                    // source was rolled back to pending.
                    timed_out = true;
                    break;
                }
                Err(error) if is_fatal(&error) => {
                    self.mark_failed(project_id, source, &error)?;
                    return Err(error);
                }
                Err(error) => {
                    self.mark_failed(project_id, source, &error)?;
                    errors.push((&error).into());
                    processed += 1;
                    self.save_checkpoint(&ckpt_store, &checkpoint, options.enable_checkpointing)?;
                }
            }
        }

        // Advisory warnings (e.g. no pinned price for the model) surface in
        // the outcome's error list without failing any source.
        for warning in &embed_warnings {
            errors.push(
                FoundryError::new(ErrorCode::InvalidInput, warning.clone())
                    .recoverable(true)
                    .into(),
            );
        }

        // -- Closure: no transient status survives the invocation -----------
        for source in &working {
            let current = self
                .store
                .read_sources(project_id)?
                .into_iter()
                .find(|s| s.id == source.id);
            if let Some(current) = current {
                if !current.status.is_resting() {
                    self.store.update_source(project_id, &source.id, |s| {
                        s.status = SourceStatus::Pending;
                    })?;
                }
            }
        }

        // -- Timeout strategy ------------------------------------------------
        let mut recommended_max_sources = None;
        if timed_out {
            match options.timeout_strategy {
                TimeoutStrategy::Skip => {}
                TimeoutStrategy::Checkpoint => {
                    self.save_checkpoint(&ckpt_store, &checkpoint, options.enable_checkpointing)?;
                }
                TimeoutStrategy::Split => {
                    self.save_checkpoint(&ckpt_store, &checkpoint, options.enable_checkpointing)?;
                    recommended_max_sources = Some((options.max_sources_per_build / 2).max(1));
                }
            }
            errors.push(
                FoundryError::new(
                    ErrorCode::BuildTimeout,
                    format!("build deadline of {} ms expired", options.build_timeout_ms),
                )
                .with_suggestion("re-run with resume_from_checkpoint=true")
                .into(),
            );
        }

        // -- Wrap up ----------------------------------------------------------
        let final_sources = self.store.read_sources(project_id)?;
        let remaining = final_sources
            .iter()
            .filter(|s| s.status == SourceStatus::Pending)
            .count();
        let has_more = remaining > 0;
        if !has_more {
            ckpt_store.clear()?;
        }

        self.store.update_project(project_id, |p| {
            p.stats.total_chunks += totals.chunks;
            p.stats.total_vectors += totals.vectors;
            p.stats.total_errors += errors.len() as u64;
            p.stats.last_build_at = Some(chrono::Utc::now());
        })?;

        extract_phase.finish(fetched_ok, totals.chunks);
        if !decoder_tags.is_empty() {
            extract_phase.tool_version = decoder_tags.iter().cloned().collect::<Vec<_>>().join(",");
        }
        chunk_phase.finish(fetched_ok, totals.chunks);
        embed_phase.finish(totals.chunks, totals.vectors);
        upsert_phase.finish(totals.vectors, totals.vectors);
        let duration_ms = started.elapsed().as_millis() as u64;

        // A timed-out invocation that made no progress is still resumable,
        // so only error-driven zero-progress runs count as failed.
        let status = if completed == 0 && !errors.is_empty() && !timed_out {
            BuildStatus::Failed
        } else if errors.is_empty() && !has_more {
            BuildStatus::Completed
        } else {
            BuildStatus::Partial
        };

        manifest.phases = vec![fetch_phase, extract_phase, chunk_phase, embed_phase, upsert_phase];
        for phase in &mut manifest.phases {
            let elapsed = match phase.phase.as_str() {
                "fetch" => fetch_time_ms,
                "chunk" | "extract" => chunk_time.as_millis() as u64,
                _ => embed_time.as_millis() as u64,
            };
            manifest.timings_ms.insert(phase.phase.clone(), elapsed);
        }
        manifest.totals.sources_fetched = fetched_ok;
        manifest.totals.chunks_created = totals.chunks;
        manifest.totals.vectors_indexed = totals.vectors;
        manifest.totals.errors = errors.len() as u64;
        for error in &errors {
            if let Some(phase) = manifest.phases.iter_mut().find(|p| p.phase == "fetch") {
                if matches!(
                    error.code,
                    ErrorCode::FetchFailed
                        | ErrorCode::FetchTimeout
                        | ErrorCode::DomainBlocked
                        | ErrorCode::FileTooLarge
                ) {
                    phase.errors.push(error.clone());
                }
            }
        }
        manifest.finish(status);

        info!(
            target: "idf.build",
            project = project_id,
            processed,
            chunks = totals.chunks,
            vectors = totals.vectors,
            remaining,
            ?status,
            "build invocation finished"
        );

        Ok(BuildOutcome {
            success: status != BuildStatus::Failed,
            status,
            chunks_added: totals.chunks,
            vectors_added: totals.vectors,
            errors,
            progress: BuildProgress {
                total_sources: final_sources.len(),
                processed_this_run: processed,
                remaining,
                has_more,
                checkpoint_id: ckpt_store.load_latest()?.map(|c| c.id),
            },
            metrics: BuildMetrics {
                duration_ms,
                fetch_time_ms,
                chunk_time_ms: chunk_time.as_millis() as u64,
                embed_time_ms: embed_time.as_millis() as u64,
                tokens_used: seeded.tokens_used + totals.tokens,
                estimated_cost_usd: totals.cost_usd,
                recommended_max_sources,
            },
            planned_sources: Vec::new(),
            manifest,
        })
    }

    // -- Fetch wave ------------------------------------------------------------

    /// Bounded worker pool over an mpsc work channel; each source is fetched
    /// independently and completion order is irrelevant (results key on id).
    async fn fetch_wave(
        &self,
        project_id: &str,
        paths: &ProjectPaths,
        working: &[SourceRecord],
        options: &BuildOptions,
    ) -> HashMap<String, Result<(Vec<RawArtifact>, Vec<FetchFailure>), FoundryError>> {
        let mut results = HashMap::new();
        if working.is_empty() {
            return results;
        }

        let (tx, rx) = mpsc::channel::<SourceRecord>(working.len());
        for source in working {
            // Channel capacity covers the whole working set.
            let _ = tx.send(source.clone()).await;
        }
        drop(tx);
        let rx = Arc::new(Mutex::new(rx));

        let width = options.fetch_concurrency.min(working.len());
        let mut pool = JoinSet::new();
        for _ in 0..width {
            let rx = Arc::clone(&rx);
            let store = self.store.clone();
            let raw_dir = paths.raw_dir.clone();
            let project_id = project_id.to_string();
            let force = options.force;
            pool.spawn(async move {
                let mut worker_results = Vec::new();
                loop {
                    let source = { rx.lock().await.recv().await };
                    let Some(source) = source else { break };
                    if let Err(e) = store.update_source(&project_id, &source.id, |s| {
                        s.status = SourceStatus::Fetching;
                    }) {
                        warn!(target: "idf.build", source = %source.id, error = %e, "status update failed");
                    }
                    let outcome = fetch_source(&raw_dir, &source, force).await;
                    worker_results.push((source.id.clone(), outcome));
                }
                worker_results
            });
        }

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(worker_results) => {
                    for (id, outcome) in worker_results {
                        results.insert(id, outcome);
                    }
                }
                Err(e) => {
                    warn!(target: "idf.build", error = %e, "fetch worker panicked");
                }
            }
        }
        results
    }

    // -- Per-source pipeline -----------------------------------------------

    /// Extract, chunk, embed, and upsert one fetched source.
    ///
    /// Returns `Ok(None)` when the deadline expired mid-source under the
    /// `skip` strategy (the source is rolled back to pending); under
    /// `checkpoint`/`split` the source is finished within the grace of its
    /// remaining batches.
    #[allow(clippy::too_many_arguments)]
    async fn process_source(
        &self,
        project_id: &str,
        collection: &str,
        source: &SourceRecord,
        artifacts: &[RawArtifact],
        chunker: &Chunker,
        client: &EmbedClient,
        writer: &IndexWriter,
        embedded_ids: &mut HashSet<String>,
        decoder_tags: &mut BTreeSet<String>,
        embed_warnings: &mut BTreeSet<String>,
        options: &BuildOptions,
        deadline: Instant,
        chunk_time: &mut Duration,
        embed_time: &mut Duration,
    ) -> Result<Option<SourceDelta>, FoundryError> {
        let mut delta = SourceDelta::default();

        // -- Extract + chunk -------------------------------------------------
        self.store.update_source(project_id, &source.id, |s| {
            s.status = SourceStatus::Chunking;
        })?;

        let chunk_started = Instant::now();
        let hint = match source.kind {
            SourceKind::Pdf => FormatHint::Pdf,
            _ => FormatHint::Auto,
        };
        let mut source_chunks: Vec<Chunk> = Vec::new();
        for artifact in artifacts {
            let (document, decoder_tag) = self
                .registry
                .extract(&artifact.data, artifact.content_type.as_deref(), hint)
                .map_err(|e| e.with_detail("uri", &artifact.uri))?;
            decoder_tags.insert(decoder_tag);

            // Paginated decoders may report OCR provenance; it rides along
            // in the chunks' custom metadata when present.
            let mut doc_custom = std::collections::BTreeMap::new();
            if let idf_extract::ExtractedDocument::Paged { ref pages, .. } = document {
                if pages.iter().any(|p| p.ocr_used) {
                    doc_custom.insert("ocr_used".to_string(), serde_json::json!(true));
                }
                if let Some(min) = pages.iter().filter_map(|p| p.confidence).reduce(f32::min) {
                    doc_custom.insert("confidence".to_string(), serde_json::json!(min));
                }
            }

            let (text, title) = document.into_text();
            let normalized = idf_chunk::normalize(&text);
            let mut chunks = chunker.chunk(&artifact.sha256, &source.id, &normalized)?;
            for chunk in &mut chunks {
                chunk.metadata.content_type = artifact.content_type.clone();
                chunk.metadata.title = title.clone();
                chunk.metadata.tags = source.tags.clone();
                chunk
                    .metadata
                    .custom
                    .extend(doc_custom.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            source_chunks.extend(chunks);
        }

        // Reprocessing replaces any stale records from an earlier attempt.
        if source.chunk_count > 0 {
            writer.truncate_sources(&HashSet::from([source.id.clone()]))?;
        }
        writer.append_chunks(&source_chunks)?;
        delta.chunks = source_chunks.len() as u64;
        *chunk_time += chunk_started.elapsed();

        self.store.update_source(project_id, &source.id, |s| {
            s.status = SourceStatus::Embedding;
            s.chunk_count = source_chunks.len() as u64;
        })?;

        // -- Embed + upsert --------------------------------------------------
        let embed_started = Instant::now();
        let mut first_batch = true;
        for batch in source_chunks.chunks(options.embedding_batch_size.max(1)) {
            // Deadline is re-checked between batches; `skip` abandons the
            // source, the other strategies finish it as their grace window.
            if !first_batch
                && Instant::now() >= deadline
                && options.timeout_strategy == TimeoutStrategy::Skip
            {
                self.store.update_source(project_id, &source.id, |s| {
                    s.status = SourceStatus::Pending;
                })?;
                *embed_time += embed_started.elapsed();
                return Ok(None);
            }
            first_batch = false;

            let output = client.embed_chunks(batch, embedded_ids, options.force).await?;
            embed_warnings.extend(output.warnings.iter().cloned());
            writer.append_vectors(&output.records, collection)?;
            for record in &output.records {
                embedded_ids.insert(record.chunk_id.clone());
            }
            delta.vectors += output.records.len() as u64;
            delta.tokens += output.tokens_used;
            delta.cost_usd += output.estimated_cost_usd;
        }
        *embed_time += embed_started.elapsed();

        self.store.update_source(project_id, &source.id, |s| {
            s.status = SourceStatus::Completed;
            s.last_error = None;
        })?;

        debug!(
            target: "idf.build",
            source = %source.id,
            chunks = delta.chunks,
            vectors = delta.vectors,
            "source completed"
        );
        Ok(Some(delta))
    }

    fn mark_failed(
        &self,
        project_id: &str,
        source: &SourceRecord,
        error: &FoundryError,
    ) -> Result<(), FoundryError> {
        warn!(target: "idf.build", source = %source.id, %error, "source failed");
        self.store.update_source(project_id, &source.id, |s| {
            s.status = SourceStatus::Failed;
            s.last_error = Some(error.to_string());
        })?;
        Ok(())
    }

    fn save_checkpoint(
        &self,
        store: &CheckpointStore,
        checkpoint: &Checkpoint,
        enabled: bool,
    ) -> Result<(), FoundryError> {
        if enabled {
            store.save(checkpoint)?;
        }
        Ok(())
    }
}

fn is_fatal(error: &FoundryError) -> bool {
    matches!(
        error.code,
        ErrorCode::DimensionMismatch | ErrorCode::MissingApiKey | ErrorCode::CheckpointWriteFailed
    )
}

fn dry_run_outcome(
    project: &idf_core::Project,
    all_sources: &[SourceRecord],
    eligible: &[SourceRecord],
    working: &[SourceRecord],
) -> BuildOutcome {
    let mut manifest = BuildManifest::start(project.config_sha256.as_str());
    manifest.finish(BuildStatus::Completed);
    BuildOutcome {
        success: true,
        status: BuildStatus::Completed,
        chunks_added: 0,
        vectors_added: 0,
        errors: Vec::new(),
        progress: BuildProgress {
            total_sources: all_sources.len(),
            processed_this_run: 0,
            remaining: eligible.len(),
            has_more: !eligible.is_empty(),
            checkpoint_id: None,
        },
        metrics: BuildMetrics::default(),
        planned_sources: working.iter().map(|s| s.id.clone()).collect(),
        manifest,
    }
}

/// Resolve a provider from a project's model descriptor.
///
/// Shared with the search surfaces, which embed query text under the same
/// provider the project was built with.
pub fn resolve_provider(model: &ModelDescriptor) -> Result<Arc<dyn EmbeddingProvider>, FoundryError> {
    match model.provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(model.dimension.unwrap_or(256)))),
        "openai" => Ok(Arc::new(
            OpenAiCompatProvider::new(OPENAI_BASE_URL, &model.model_name)
                .with_key_from_env(&model.api_key_env),
        )),
        other => Err(FoundryError::new(
            ErrorCode::InvalidInput,
            format!("unknown embedding provider {other:?}"),
        )
        .with_suggestion("use one of: mock, openai")),
    }
}

/// Fetch one source's artifacts into the blob store.
async fn fetch_source(
    raw_dir: &Path,
    source: &SourceRecord,
    force: bool,
) -> Result<(Vec<RawArtifact>, Vec<FetchFailure>), FoundryError> {
    let mut blob_store = BlobStore::new(raw_dir);
    if let Some(cap) = source.options.max_file_bytes {
        blob_store = blob_store.with_byte_cap(cap);
    }
    let fetcher =
        Fetcher::new(blob_store).with_allowlist(source.options.allow_domains.clone());

    match source.kind {
        SourceKind::Url => {
            let artifact = fetcher.fetch_url(&source.uri, force).await?;
            Ok((vec![artifact], Vec::new()))
        }
        SourceKind::Pdf => {
            let artifact = fetcher.fetch_pdf(&source.uri, force).await?;
            Ok((vec![artifact], Vec::new()))
        }
        SourceKind::Sitemap => {
            let sitemap_options = SitemapOptions {
                include: source.options.include.clone(),
                exclude: source.options.exclude.clone(),
                max_pages: source.options.max_pages.unwrap_or(50),
                concurrency: source.options.concurrency.unwrap_or(3),
            };
            let outcome = fetcher
                .fetch_sitemap(&source.uri, &sitemap_options, force)
                .await?;
            finish_fanout(outcome)
        }
        SourceKind::Folder => {
            let folder_options = FolderOptions {
                include: source.options.include.clone(),
                exclude: source.options.exclude.clone(),
                max_files: source.options.max_pages,
                max_file_bytes: source.options.max_file_bytes,
            };
            let outcome = fetcher
                .fetch_folder(Path::new(&source.uri), &folder_options, force)
                .await?;
            finish_fanout(outcome)
        }
    }
}

fn finish_fanout(
    outcome: idf_fetch::FanoutOutcome,
) -> Result<(Vec<RawArtifact>, Vec<FetchFailure>), FoundryError> {
    if outcome.artifacts.is_empty() {
        if let Some(first) = outcome.failures.into_iter().next() {
            return Err(first.error);
        }
        return Err(FoundryError::new(
            ErrorCode::FetchFailed,
            "source yielded no artifacts",
        ));
    }
    Ok((outcome.artifacts, outcome.failures))
}
