// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use idf_build::{BuildEngine, BuildOptions, TimeoutStrategy, resolve_provider};
use idf_cli::format;
use idf_core::{
    ChunkConfig, ChunkStrategy, ModelDescriptor, SourceKind, SourceOptions, SourceRecord,
};
use idf_embed::EmbeddingProvider;
use idf_index::{Retriever, SearchMode, SearchQuery};
use idf_server::{ServerRegistry, hydrate};
use idf_workspace::{ProjectManager, ProjectStore, Workspace};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "foundry", version, about = "Index Foundry CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Emit JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Project lifecycle.
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Source ledger operations.
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },
    /// Run a build invocation.
    Build {
        /// Project slug.
        project: String,

        /// Rebuild completed sources.
        #[arg(long)]
        force: bool,

        /// Plan only; no side effects.
        #[arg(long)]
        dry_run: bool,

        /// Working-set cap (1..=50).
        #[arg(long, default_value_t = 10)]
        max_sources: usize,

        /// Fetch pool width (1..=10).
        #[arg(long, default_value_t = 3)]
        fetch_concurrency: usize,

        /// Embedding batch size (10..=100).
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Disable per-source checkpointing.
        #[arg(long)]
        no_checkpoint: bool,

        /// Invocation deadline in milliseconds.
        #[arg(long, default_value_t = 300_000)]
        timeout_ms: u64,

        /// Deadline behaviour.
        #[arg(long, value_enum, default_value_t = TimeoutStrategyArg::Checkpoint)]
        timeout_strategy: TimeoutStrategyArg,

        /// Resume from the latest checkpoint.
        #[arg(long)]
        resume: bool,
    },
    /// Query a project's index.
    Search {
        /// Project slug.
        project: String,

        /// Query text.
        query: String,

        /// Search mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Hybrid)]
        mode: ModeArg,

        /// Results to return (1..=100).
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Semantic weight for hybrid fusion.
        #[arg(long, default_value_t = 0.7)]
        alpha: f32,
    },
    /// Serve a project's search API.
    Serve {
        /// Project slug.
        project: String,

        /// Bind address.
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    /// Create a project.
    Create {
        /// Project slug (`^[a-z0-9][a-z0-9-]*$`).
        id: String,

        /// Embedding provider.
        #[arg(long, default_value = "mock")]
        provider: String,

        /// Model name as the provider spells it.
        #[arg(long, default_value = "mock-hash")]
        model_name: String,

        /// Expected vector dimension.
        #[arg(long, default_value_t = 256)]
        dimension: usize,

        /// Environment variable holding the provider API key.
        #[arg(long, default_value = "")]
        api_key_env: String,

        /// Chunking strategy.
        #[arg(long, value_enum, default_value_t = StrategyArg::Recursive)]
        strategy: StrategyArg,

        /// Maximum chunk length in chars.
        #[arg(long, default_value_t = 1000)]
        max_chars: usize,

        /// Minimum chunk length in chars.
        #[arg(long, default_value_t = 80)]
        min_chars: usize,

        /// Overlap carried between chunks.
        #[arg(long, default_value_t = 100)]
        overlap: usize,

        /// L2-normalise stored vectors.
        #[arg(long)]
        normalize: bool,
    },
    /// List project slugs.
    List,
    /// Show one project.
    Show {
        /// Project slug.
        id: String,
    },
    /// Delete a project and everything under it.
    Delete {
        /// Project slug.
        id: String,

        /// Destructive operations require explicit confirmation.
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SourceCommands {
    /// Register a source.
    Add {
        /// Project slug.
        project: String,

        /// Source kind.
        #[arg(long, value_enum)]
        kind: KindArg,

        /// URL, sitemap URL, directory path, or PDF location.
        #[arg(long)]
        uri: String,

        /// Display name (defaults to the URI).
        #[arg(long)]
        name: Option<String>,

        /// Tags copied into chunk metadata. Can be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Hostname allowlist. Can be repeated.
        #[arg(long = "allow-domain")]
        allow_domains: Vec<String>,

        /// Include pattern (regex for sitemaps, glob for folders).
        #[arg(long = "include")]
        include: Vec<String>,

        /// Exclude pattern, applied after includes.
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Cap on sitemap pages or folder files.
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// List a project's sources.
    List {
        /// Project slug.
        project: String,
    },
    /// Remove a source.
    Remove {
        /// Project slug.
        project: String,

        /// Source id (`src_...`).
        source_id: String,

        /// Also drop the source's chunks and vectors.
        #[arg(long)]
        cascade: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Url,
    Sitemap,
    Folder,
    Pdf,
}

impl From<KindArg> for SourceKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Url => SourceKind::Url,
            KindArg::Sitemap => SourceKind::Sitemap,
            KindArg::Folder => SourceKind::Folder,
            KindArg::Pdf => SourceKind::Pdf,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Fixed,
    Paragraph,
    Heading,
    Page,
    Sentence,
    Recursive,
    Hierarchical,
}

impl From<StrategyArg> for ChunkStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Fixed => ChunkStrategy::Fixed,
            StrategyArg::Paragraph => ChunkStrategy::Paragraph,
            StrategyArg::Heading => ChunkStrategy::Heading,
            StrategyArg::Page => ChunkStrategy::Page,
            StrategyArg::Sentence => ChunkStrategy::Sentence,
            StrategyArg::Recursive => ChunkStrategy::Recursive,
            StrategyArg::Hierarchical => ChunkStrategy::Hierarchical,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Semantic,
    Keyword,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Semantic => SearchMode::Semantic,
            ModeArg::Keyword => SearchMode::Keyword,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimeoutStrategyArg {
    Skip,
    Checkpoint,
    Split,
}

impl From<TimeoutStrategyArg> for TimeoutStrategy {
    fn from(arg: TimeoutStrategyArg) -> Self {
        match arg {
            TimeoutStrategyArg::Skip => TimeoutStrategy::Skip,
            TimeoutStrategyArg::Checkpoint => TimeoutStrategy::Checkpoint,
            TimeoutStrategyArg::Split => TimeoutStrategy::Split,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("idf=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("idf=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = Workspace::from_env();
    let manager = ProjectManager::new(workspace.clone());
    let json = cli.json;

    match cli.command {
        Commands::Project { command } => project_command(&manager, command, json),
        Commands::Source { command } => source_command(&manager, command, json),
        Commands::Build {
            project,
            force,
            dry_run,
            max_sources,
            fetch_concurrency,
            batch_size,
            no_checkpoint,
            timeout_ms,
            timeout_strategy,
            resume,
        } => {
            let engine = BuildEngine::new(ProjectStore::new(workspace));
            let options = BuildOptions {
                force,
                dry_run,
                max_sources_per_build: max_sources,
                fetch_concurrency,
                embedding_batch_size: batch_size,
                enable_checkpointing: !no_checkpoint,
                build_timeout_ms: timeout_ms,
                timeout_strategy: timeout_strategy.into(),
                resume_from_checkpoint: resume,
                checkpoint_id: None,
            };
            let outcome = engine.build(&project, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "{}: +{} chunks, +{} vectors in {} ms ({} source(s) processed, {} remaining{})",
                    if outcome.success { "ok" } else { "failed" },
                    outcome.chunks_added,
                    outcome.vectors_added,
                    outcome.metrics.duration_ms,
                    outcome.progress.processed_this_run,
                    outcome.progress.remaining,
                    if outcome.progress.has_more {
                        "; re-run to continue"
                    } else {
                        ""
                    },
                );
                for error in &outcome.errors {
                    println!("  warn [{:?}] {}", error.code, error.message);
                }
                if !outcome.planned_sources.is_empty() {
                    println!("  planned: {}", outcome.planned_sources.join(", "));
                }
            }
            Ok(())
        }
        Commands::Search {
            project,
            query,
            mode,
            top_k,
            alpha,
        } => {
            let store = ProjectStore::new(workspace);
            let loaded = store.load_project(&project)?;
            let retriever = Retriever::load(&store.paths(&project).data_dir)?;

            let mut search = SearchQuery::new(query);
            search.mode = mode.into();
            search.top_k = top_k;
            search.alpha = alpha;

            // Embed the query with the project's provider when one is
            // constructible; otherwise the retriever falls back to keyword.
            if !matches!(search.mode, SearchMode::Keyword) {
                if let Ok(provider) = resolve_provider(&loaded.model) {
                    let batch = [search.text.clone()];
                    if let Ok(mut embeddings) = provider.embed_batch(&batch).await {
                        if let Some(first) = embeddings.pop() {
                            search.vector = Some(first.vector);
                        }
                    }
                }
            }

            let response = retriever.search(&search)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", format::search_rows(&response));
            }
            Ok(())
        }
        Commands::Serve { project, bind } => {
            let store = ProjectStore::new(workspace);
            let state = Arc::new(hydrate(&store, &project)?);
            let registry = ServerRegistry::new();
            let addr = registry.start(state, &bind).await?;
            println!("serving {project} on http://{addr}");
            tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
            registry.stop(&project).await?;
            Ok(())
        }
    }
}

fn project_command(manager: &ProjectManager, command: ProjectCommands, json: bool) -> Result<()> {
    match command {
        ProjectCommands::Create {
            id,
            provider,
            model_name,
            dimension,
            api_key_env,
            strategy,
            max_chars,
            min_chars,
            overlap,
            normalize,
        } => {
            let model = ModelDescriptor {
                provider,
                model_name,
                dimension: Some(dimension),
                api_key_env,
            };
            let chunking = ChunkConfig {
                strategy: strategy.into(),
                max_chars,
                min_chars,
                overlap_chars: overlap,
                ..ChunkConfig::default()
            };
            let mut project = manager.create_project(&id, model, chunking)?;
            if normalize {
                project = manager.store().update_project(&id, |p| {
                    p.normalize_vectors = true;
                })?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&project)?);
            } else {
                println!("created {}", format::project_block(&project));
            }
            Ok(())
        }
        ProjectCommands::List => {
            let ids = manager.list_projects()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
            Ok(())
        }
        ProjectCommands::Show { id } => {
            let project = manager.get_project(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&project)?);
            } else {
                println!("{}", format::project_block(&project));
            }
            Ok(())
        }
        ProjectCommands::Delete { id, confirm } => {
            manager.delete_project(&id, confirm)?;
            println!("deleted {id}");
            Ok(())
        }
    }
}

fn source_command(manager: &ProjectManager, command: SourceCommands, json: bool) -> Result<()> {
    match command {
        SourceCommands::Add {
            project,
            kind,
            uri,
            name,
            tags,
            allow_domains,
            include,
            exclude,
            max_pages,
        } => {
            let name = name.unwrap_or_else(|| uri.clone());
            let record = SourceRecord::new(kind.into(), uri, name)
                .with_tags(tags)
                .with_options(SourceOptions {
                    allow_domains,
                    include,
                    exclude,
                    max_pages,
                    ..SourceOptions::default()
                });
            let record = manager.add_source(&project, record)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("added {} ({})", record.id, record.kind);
            }
            Ok(())
        }
        SourceCommands::List { project } => {
            let sources = manager.list_sources(&project)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print!("{}", format::source_rows(&sources));
            }
            Ok(())
        }
        SourceCommands::Remove {
            project,
            source_id,
            cascade,
        } => {
            manager.remove_source(&project, &source_id, cascade)?;
            println!("removed {source_id}");
            Ok(())
        }
    }
}
