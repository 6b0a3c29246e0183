//! HTTP API for health checks, Prometheus metrics and the last run

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use flex_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::RunMetrics,
    orchestrator::RunReport,
    ScoreRecord,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Outcome of the most recent successful run
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub window_start: String,
    pub window_end: String,
    /// `None` when the snapshot could not be archived
    pub snapshot_key: Option<String>,
    pub skipped_accounts: Vec<String>,
    pub scores: BTreeMap<String, ScoreRecord>,
}

impl From<&RunReport> for LastRun {
    fn from(report: &RunReport) -> Self {
        Self {
            window_start: report.window.start().to_rfc3339(),
            window_end: report.window.end().to_rfc3339(),
            snapshot_key: report.snapshot_key.clone(),
            skipped_accounts: report.skipped_accounts.clone(),
            scores: report.snapshot.clone(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: RunMetrics,
    pub last_run: Arc<RwLock<Option<LastRun>>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: RunMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_run(&self, report: &RunReport) {
        *self.last_run.write().await = Some(LastRun::from(report));
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Some accounts skipped
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once configuration is loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Daily scores of the last successful run, 404 before the first one
async fn last_run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.last_run.read().await.clone() {
        Some(run) => (StatusCode::OK, Json(Some(run))),
        None => (StatusCode::NOT_FOUND, Json(None)),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/scores/latest", get(last_run))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
