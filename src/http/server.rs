//! HTTP server setup.
//!
//! # Responsibilities
//! - Take the router built by a [`ServiceHandle`]
//! - Bind it to a listener
//! - Stop accepting on the shutdown broadcast and drain in-flight requests

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::compose::ServiceHandle;

/// HTTP server for a composed service.
pub struct HttpServer {
    router: Router,
    profile: String,
}

impl HttpServer {
    pub fn new(handle: &ServiceHandle) -> Self {
        Self {
            router: handle.router(),
            profile: handle.profile().name.clone(),
        }
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            profile = %self.profile,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
