//! Readiness probe endpoint.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use super::{request_id::RequestContext, timestamp, AppState};
use crate::checks::CheckResults;

/// Aggregate of every readiness sub-check, built fresh per probe.
#[derive(Debug, Serialize)]
pub struct ReadinessSnapshot {
    pub status: &'static str,
    pub timestamp: String,
    pub checks: CheckResults,
    pub request_id: String,
}

/// `GET /ready` - 200 `READY` when every check passes, 503 `NOT_READY` otherwise.
pub async fn ready(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> (StatusCode, Json<ReadinessSnapshot>) {
    let checks = state.readiness.evaluate().await;

    let (code, status) = if checks.all_passed() {
        (StatusCode::OK, "READY")
    } else {
        let failing: Vec<&str> = checks
            .0
            .iter()
            .filter(|(_, r)| !r.passed())
            .map(|(name, _)| name.as_str())
            .collect();
        warn!(request_id = %ctx.id, ?failing, "readiness check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    };

    let snapshot = ReadinessSnapshot {
        status,
        timestamp: timestamp(),
        checks,
        request_id: ctx.id,
    };
    (code, Json(snapshot))
}
