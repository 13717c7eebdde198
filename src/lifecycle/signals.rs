//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Translate either into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed is logged and ignored; the other
//!   signal still works
//! - A server task that ends on its own is not kept waiting for a signal

use std::future::Future;
use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Resolve once the process is asked to stop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Shutdown requested"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Shutdown requested"),
    }
}

/// Wait for `server` to finish, triggering `shutdown` first if `stop`
/// resolves while it is still running.
pub async fn supervise<F>(
    mut server: JoinHandle<io::Result<()>>,
    stop: F,
    shutdown: &Shutdown,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        joined = &mut server => {
            tracing::warn!("Server task ended before a shutdown was requested");
            return flatten(joined);
        }
        _ = stop => shutdown.trigger(),
    }
    flatten(server.await)
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    joined.unwrap_or_else(|e| Err(io::Error::other(e)))
}
