//! Read-only HTTP status surface: `/health` and `/status`

use crate::engine::Engine;
use crate::observability::{Metrics, MetricsSnapshot};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use std::sync::Arc;

/// What the status endpoint knows about one running engine
#[derive(Clone)]
pub struct EngineStatus {
    pub endpoint: String,
    pub instance_id: String,
    pub metrics: Arc<Metrics>,
}

impl EngineStatus {
    pub fn of(engine: &Engine) -> Self {
        Self {
            endpoint: engine.endpoint().name().to_string(),
            instance_id: engine.instance_id().to_string(),
            metrics: engine.metrics(),
        }
    }
}

#[derive(Clone, Default)]
pub struct StatusState {
    engines: Arc<Vec<EngineStatus>>,
}

impl StatusState {
    pub fn new(engines: Vec<EngineStatus>) -> Self {
        Self {
            engines: Arc::new(engines),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub instance_id: String,
    pub counters: MetricsSnapshot,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn status(State(state): State<StatusState>) -> Json<Vec<EndpointReport>> {
    let reports = state
        .engines
        .iter()
        .map(|engine| EndpointReport {
            endpoint: engine.endpoint.clone(),
            instance_id: engine.instance_id.clone(),
            counters: engine.metrics.snapshot(),
        })
        .collect();

    Json(reports)
}
