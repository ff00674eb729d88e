// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-scoped registry of running search servers.
//!
//! Keyed by project id: starting a second server for the same project fails
//! with `ALREADY_RUNNING`; stop signals graceful shutdown (drain, then close
//! the listener) and fails with `NOT_RUNNING` when nothing is registered.

use crate::{AppState, build_app};
use idf_error::{ErrorCode, FoundryError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::info;

struct RunningServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Running search servers, one per project at most.
#[derive(Default)]
pub struct ServerRegistry {
    servers: Mutex<HashMap<String, RunningServer>>,
}

impl ServerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `bind_addr` and serve `state`'s project from it.
    ///
    /// Returns the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// `ALREADY_RUNNING` when the project is already served from this
    /// process; `SERVE_FAILED` when the listener cannot bind.
    pub async fn start(
        &self,
        state: Arc<AppState>,
        bind_addr: &str,
    ) -> Result<SocketAddr, FoundryError> {
        let mut servers = self.servers.lock().await;
        let project_id = state.project_id.clone();
        if servers.contains_key(&project_id) {
            return Err(FoundryError::new(
                ErrorCode::AlreadyRunning,
                format!("project {project_id:?} already has a running server"),
            )
            .with_detail("project_id", &project_id));
        }

        let listener = tokio::net::TcpListener::bind(bind_addr).await.map_err(|e| {
            FoundryError::new(ErrorCode::ServeFailed, format!("bind {bind_addr}: {e}"))
                .with_detail("bind", bind_addr)
        })?;
        let addr = listener.local_addr().map_err(|e| {
            FoundryError::new(ErrorCode::ServeFailed, format!("local_addr: {e}"))
        })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = build_app(state);
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                // Drain once the stop flag flips.
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            });
            if let Err(e) = serve.await {
                tracing::error!(target: "idf.server", error = %e, "server exited with error");
            }
        });

        info!(target: "idf.server", project = %project_id, %addr, "search server started");
        servers.insert(
            project_id,
            RunningServer {
                addr,
                shutdown: shutdown_tx,
                handle,
            },
        );
        Ok(addr)
    }

    /// Gracefully stop the project's server and wait for it to drain.
    ///
    /// # Errors
    ///
    /// `NOT_RUNNING` when no server is registered for the project.
    pub async fn stop(&self, project_id: &str) -> Result<(), FoundryError> {
        let server = {
            let mut servers = self.servers.lock().await;
            servers.remove(project_id).ok_or_else(|| {
                FoundryError::new(
                    ErrorCode::NotRunning,
                    format!("no running server for project {project_id:?}"),
                )
                .with_detail("project_id", project_id)
            })?
        };
        let _ = server.shutdown.send(true);
        let _ = server.handle.await;
        info!(target: "idf.server", project = project_id, "search server stopped");
        Ok(())
    }

    /// `(project_id, addr)` for every running server, sorted by project.
    pub async fn list(&self) -> Vec<(String, SocketAddr)> {
        let servers = self.servers.lock().await;
        let mut out: Vec<(String, SocketAddr)> = servers
            .iter()
            .map(|(id, server)| (id.clone(), server.addr))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
