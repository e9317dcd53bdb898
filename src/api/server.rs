//! Server lifecycle: bind, serve `build_router()`, stop on a shutdown
//! signal.
//!
//! `serve()` is the production entry point and stops on Ctrl-C.
//! `start_server_on()` spawns the server in a background task and returns a
//! handle with a shutdown channel.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::api::router::build_router;
use crate::core_state::CoreState;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Handle to a server running in a background task.
#[derive(Debug)]
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RunningServer {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Server shutdown signal sent");
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

async fn run<F>(listener: TcpListener, core: Arc<CoreState>, signal: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(core);
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(ServerError::Serve)
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received, shutting down");
}

/// Serve on the configured address until Ctrl-C.
pub async fn serve(core: Arc<CoreState>) -> Result<(), ServerError> {
    let listener = bind(core.config.bind).await?;
    let addr = listener.local_addr().map_err(ServerError::Serve)?;
    tracing::info!(%addr, storage = %core.config.storage_dir.display(), "Server started");

    run(listener, core, ctrl_c()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Bind `addr` (port 0 for ephemeral) and serve in a background task.
pub async fn start_server_on(
    core: Arc<CoreState>,
    addr: SocketAddr,
) -> Result<RunningServer, ServerError> {
    let listener = bind(addr).await?;
    let addr = listener.local_addr().map_err(ServerError::Serve)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let signal = async move {
        let _ = shutdown_rx.await;
        tracing::info!("Server received shutdown signal");
    };

    tokio::spawn(async move {
        tracing::info!(%addr, "Server started");
        if let Err(e) = run(listener, core, signal).await {
            tracing::error!("{e}");
        }
        tracing::info!("Server stopped");
    });

    Ok(RunningServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}
