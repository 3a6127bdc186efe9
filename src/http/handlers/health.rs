//! Liveness and metrics.

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::super::AppState;
use crate::telemetry;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub services: BTreeMap<&'static str, bool>,
}

/// GET /health - Storage liveness.
pub(crate) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.services.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(target: "http", error = %e, "health check failed");
            false
        },
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            healthy: database,
            services: BTreeMap::from([("database", database)]),
        }),
    )
}

/// GET /metrics - Prometheus exposition.
pub(crate) async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry::render_metrics(),
    )
}
