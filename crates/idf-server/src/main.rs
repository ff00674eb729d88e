// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use clap::Parser;
use idf_server::{ServerRegistry, hydrate};
use idf_workspace::{ProjectStore, Workspace};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "foundry-serve", version, about = "Index Foundry search server")]
struct Args {
    /// Project to serve.
    #[arg(long)]
    project: String,

    /// Bind address; the port falls back to the PORT environment variable.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("idf=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("idf=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Generated search servers honour PORT when set.
    let bind = match std::env::var("PORT") {
        Ok(port) if !port.is_empty() => {
            let host = args.bind.rsplit_once(':').map(|(h, _)| h).unwrap_or("127.0.0.1");
            format!("{host}:{port}")
        }
        _ => args.bind.clone(),
    };

    let store = ProjectStore::new(Workspace::from_env());
    let state = match hydrate(&store, &args.project) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let registry = ServerRegistry::new();
    let addr = match registry.start(state, &bind).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("{e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    info!(target: "idf.server", %addr, project = %args.project, "listening");

    if tokio::signal::ctrl_c().await.is_ok() {
        let _ = registry.stop(&args.project).await;
    }
    std::process::ExitCode::SUCCESS
}
