use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::info;

mod api;
mod checks;
mod config;
mod error;
mod fatal;
mod lifecycle;
mod process_stats;
mod telemetry;

use checks::{LifecycleCheck, Readiness};
use config::Config;
use lifecycle::{Lifecycle, ShutdownOutcome};
use telemetry::LogFormat;

#[tokio::main]
async fn main() {
    // When invoked as a container HEALTHCHECK, probe /health and exit immediately.
    // This avoids needing any external tool (curl/wget) in the image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        let port = healthcheck_port(Config::from_env());
        let code = match healthcheck(&healthcheck_url(port)).await {
            Ok(true) => 0,
            _ => fatal::FAILURE_EXIT,
        };
        std::process::exit(code);
    }

    telemetry::init(LogFormat::from_env());
    fatal::install_panic_hook();

    let code = fatal::supervise(run()).await;
    std::process::exit(code);
}

async fn run() -> anyhow::Result<ShutdownOutcome> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let lifecycle = Lifecycle::new(config.shutdown_timeout());
    let signals = lifecycle::listen_for_signals().context("Failed to install signal handlers")?;

    info!(
        %addr,
        environment = %config.environment,
        version = %config.version,
        pid = std::process::id(),
        hostname = %process_stats::hostname(),
        state = %lifecycle.state(),
        "lifeline listening"
    );

    let readiness = Readiness::new(checks::placeholder_checks(), config.readiness_check_timeout())
        .with_check(Arc::new(LifecycleCheck::new(lifecycle.subscribe())));
    let state = Arc::new(api::AppState::new(Arc::new(config), readiness));

    Ok(lifecycle.run(listener, api::app(state), signals).await)
}

/// Port the service was configured with, resolved through the same layers
/// as `run`; falls back to the default when the config cannot be loaded.
fn healthcheck_port(resolved: anyhow::Result<Config>) -> u16 {
    resolved.map_or(config::DEFAULT_PORT, |config| config.port)
}

fn healthcheck_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/health")
}

/// Lightweight liveness probe: `true` on a 2xx from `url`.
/// Invoked via `lifeline --healthcheck` from a container HEALTHCHECK.
async fn healthcheck(url: &str) -> anyhow::Result<bool> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?;
    Ok(resp.status().is_success())
}
