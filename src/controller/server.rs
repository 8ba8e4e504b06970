//! # HTTP Server
//!
//! Serves Prometheus metrics and liveness/readiness probes for the
//! controller deployment.

use crate::observability;
use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared readiness state between the server and the controller runtime.
#[derive(Debug)]
pub struct ServerState {
    /// Flipped once the listener is bound and the controller can serve
    /// readiness probes.
    pub is_ready: Arc<AtomicBool>,
}

/// Start the metrics/probes server and serve until the process exits.
///
/// Marks `state.is_ready` once the listener is bound so readiness probes pass
/// as soon as the port is open.
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("HTTP server listening on port {port}");
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics() -> (StatusCode, String) {
    match observability::metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        ),
    }
}
