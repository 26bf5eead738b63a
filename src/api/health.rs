//! Liveness probe endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::{request_id::RequestContext, timestamp, AppState};
use crate::process_stats::{self, CpuUsage, MemoryUsage};

/// Point-in-time process snapshot returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct LivenessSnapshot {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_secs: f64,
    pub hostname: String,
    pub environment: String,
    pub version: String,
    pub pid: u32,
    pub memory: MemoryUsage,
    pub cpu: CpuUsage,
    pub request_id: String,
}

impl LivenessSnapshot {
    pub fn capture(state: &AppState, request_id: String) -> Self {
        Self {
            status: "OK",
            timestamp: timestamp(),
            uptime_secs: state.uptime_secs(),
            hostname: process_stats::hostname(),
            environment: state.config.environment.clone(),
            version: state.config.version.clone(),
            pid: std::process::id(),
            memory: process_stats::memory_usage(),
            cpu: process_stats::cpu_usage(),
            request_id,
        }
    }
}

/// `GET /health` - always 200 while the process can answer at all.
///
/// Consults no dependency, so an orchestrator can tell "alive" apart from
/// "ready" (see [`super::ready`]).
pub async fn health(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Json<LivenessSnapshot> {
    Json(LivenessSnapshot::capture(&state, ctx.id))
}
