//! HTTP server lifecycle
//!
//! Binds the axum router and serves until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use prevue_api::{create_router, AppState};
use prevue_core::bootstrap::Services;
use prevue_core::Config;

pub struct PrevueServer {
    config: Arc<Config>,
    services: Services,
}

impl PrevueServer {
    #[must_use]
    pub fn new(config: Arc<Config>, services: Services) -> Self {
        Self { config, services }
    }

    /// Serve HTTP until ctrl-c / SIGTERM.
    pub async fn start(self) -> Result<()> {
        let state = AppState::new(self.config.clone(), &self.services);
        let router = create_router(state);

        let address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot bind {address}: {e}"))?;
        info!("HTTP server listening on {}", address);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
