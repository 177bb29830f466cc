//! HTTP surface: the form page, the file downloads and a health probe.

mod handlers;
mod page;

use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use tokio::{net::TcpListener, sync::Semaphore};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    credentials::CredentialLocator, orchestrator::Orchestrator, outside::Transcoder,
    rate_limit::RequestLimiter,
};

/// Shared by every request
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub credentials: Arc<CredentialLocator>,
    pub transcoder: Arc<dyn Transcoder>,
    pub limiter: Arc<dyn RequestLimiter>,
    /// Bounds the downloads running at the same time
    pub downloads: Arc<Semaphore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::submit))
        .route("/download/{filename}", get(handlers::download))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C is received
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(err) => {
            warn!("Could not listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    }
}
