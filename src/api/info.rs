//! Plain informational endpoints: service info, endpoint listing, build identity.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;

use super::{request_id::RequestContext, timestamp, AppState};
use crate::process_stats::{self, HostMemory};

const ENDPOINTS: &[&str] = &[
    "GET / - Application information",
    "GET /health - Health check",
    "GET /ready - Readiness check",
    "GET /api/info - API information",
    "GET /api/version - Version information",
];

#[derive(Debug, Serialize)]
pub struct AppInfo {
    pub message: &'static str,
    pub version: String,
    pub environment: String,
    pub timestamp: String,
    pub hostname: String,
    pub platform: &'static str,
    pub architecture: &'static str,
    pub service_version: &'static str,
    pub request_id: String,
    pub uptime_secs: f64,
    pub load_average: Option<[f64; 3]>,
    pub host_memory: HostMemory,
    pub cpu_count: usize,
}

/// `GET /` - who is answering and on what.
pub async fn root(State(state): State<Arc<AppState>>, ctx: RequestContext) -> Json<AppInfo> {
    info!(request_id = %ctx.id, "serving application info");
    Json(AppInfo {
        message: "Hello from lifeline!",
        version: state.config.version.clone(),
        environment: state.config.environment.clone(),
        timestamp: timestamp(),
        hostname: process_stats::hostname(),
        platform: std::env::consts::OS,
        architecture: std::env::consts::ARCH,
        service_version: env!("CARGO_PKG_VERSION"),
        request_id: ctx.id,
        uptime_secs: state.uptime_secs(),
        load_average: process_stats::load_average(),
        host_memory: process_stats::host_memory(),
        cpu_count: process_stats::cpu_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub api: &'static str,
    pub version: String,
    pub endpoints: &'static [&'static str],
    pub timestamp: String,
    pub request_id: String,
}

/// `GET /api/info` - the endpoint listing.
pub async fn api_info(State(state): State<Arc<AppState>>, ctx: RequestContext) -> Json<ApiInfo> {
    Json(ApiInfo {
        api: "lifeline status API",
        version: state.config.version.clone(),
        endpoints: ENDPOINTS,
        timestamp: timestamp(),
        request_id: ctx.id,
    })
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub environment: String,
    pub build_time: String,
    pub git_commit: String,
    pub request_id: String,
}

/// `GET /api/version` - build identity.
pub async fn version(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Json<VersionInfo> {
    Json(VersionInfo {
        version: state.config.version.clone(),
        environment: state.config.environment.clone(),
        build_time: state.config.build_time().to_owned(),
        git_commit: state.config.git_commit().to_owned(),
        request_id: ctx.id,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::{
        app,
        test_support::{body_json, get, state},
    };

    #[tokio::test]
    async fn root_describes_the_service() {
        let resp = get(app(state("development")), "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["version"], "9.9.9");
        assert_eq!(json["environment"], "development");
        assert_eq!(json["platform"], std::env::consts::OS);
        assert!(json["cpu_count"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn api_info_lists_every_endpoint() {
        let json = body_json(get(app(state("development")), "/api/info").await).await;
        let endpoints = json["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 5);
        for path in ["/health", "/ready", "/api/info", "/api/version"] {
            assert!(
                endpoints.iter().any(|e| e.as_str().unwrap().contains(path)),
                "missing {path}"
            );
        }
    }

    #[tokio::test]
    async fn version_reports_unknown_for_unset_build_fields() {
        let json = body_json(get(app(state("production")), "/api/version").await).await;
        assert_eq!(json["version"], "9.9.9");
        assert_eq!(json["environment"], "production");
        assert_eq!(json["build_time"], "unknown");
        assert_eq!(json["git_commit"], "cafebabe");
    }
}
