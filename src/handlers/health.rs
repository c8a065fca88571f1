use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::time::Instant;
use tracing::error;

use crate::handlers::AppState;

/// Liveness plus a database ping. Answers 503 when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let db = crate::db::check_connection(&state.db).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (status, label) = match &db {
        Ok(()) => (StatusCode::OK, "up"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "down"),
    };

    (
        status,
        Json(json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.environment,
            "checks": {
                "database": {
                    "status": label,
                    "latency_ms": latency_ms,
                    "error": db.err().map(|e| e.to_string()),
                }
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
