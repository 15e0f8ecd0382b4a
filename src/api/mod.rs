//! HTTP scrape endpoint.
//!
//! Two routes are served: `GET /metrics` returns the Prometheus text
//! exposition of every aggregated series and `GET /health` returns a JSON
//! summary of the collector and receiver counters.

use crate::collector::{Collector, CollectorStats};
use crate::core::{MetricsConfig, Result, TallyError};
use crate::export::render_prometheus;
use crate::receiver::{ReceiverStats, UdpReceiver};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// API server state.
#[derive(Clone)]
pub struct ApiState {
    collector: Arc<Collector>,
    receiver: Option<Arc<UdpReceiver>>,
}

impl ApiState {
    pub fn new(collector: Arc<Collector>) -> Self {
        Self {
            collector,
            receiver: None,
        }
    }

    /// Include ingestion counters of `receiver` in responses
    pub fn with_receiver(mut self, receiver: Arc<UdpReceiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: i64,
    collector: CollectorStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver: Option<ReceiverStats>,
}

/// Build the router without binding it.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the scrape listener.
pub async fn bind(config: &MetricsConfig) -> Result<TcpListener> {
    let addr = SocketAddr::new(config.host, config.port);
    TcpListener::bind(addr).await.map_err(|e| {
        TallyError::network(format!("Failed to bind metrics server to {}: {}", addr, e))
    })
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Starting metrics server on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| TallyError::network(format!("Metrics server error: {}", e)))?;

    tracing::info!("Metrics server stopped");
    Ok(())
}

/// GET /metrics - Prometheus text exposition
async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.collector.snapshot();
    let receiver = state.receiver.as_ref().map(|r| r.stats());
    let body = render_prometheus(&snapshot, &state.collector.stats(), receiver.as_ref());

    (StatusCode::OK, [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

/// GET /health - Collector and receiver counters
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let collector = state.collector.stats();
    let uptime_seconds = (Utc::now() - collector.started_at).num_seconds().max(0);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        collector,
        receiver: state.receiver.as_ref().map(|r| r.stats()),
    })
}
