//! HTTP surface: routes, fallbacks, and the middleware stack.
//!
//! Every request passes through [`request_id::tag_request`] before anything
//! else that can produce a body, so the not-found handler, the error
//! middleware, and every endpoint can stamp the same id into their reply.
//! The same middleware writes the access log.

use std::{sync::Arc, time::Instant};

use axum::{
    http::{header, HeaderValue},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use chrono::{SecondsFormat, Utc};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{checks::Readiness, config::Config};

pub mod fallback;
pub mod health;
pub mod info;
pub mod ready;
pub mod request_id;

/// Shared application state injected into every handler via [`axum::extract::State`].
pub struct AppState {
    pub config: Arc<Config>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
    pub readiness: Readiness,
}

impl AppState {
    pub fn new(config: Arc<Config>, readiness: Readiness) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            readiness,
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// RFC 3339 timestamp with millisecond precision, as stamped on every body.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the complete service.
pub fn app(state: Arc<AppState>) -> Router {
    layered(routes(), state)
}

/// The declared endpoints, without fallbacks or middleware.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(ready::ready))
        .route("/", get(info::root))
        .route("/api/info", get(info::api_info))
        .route("/api/version", get(info::version))
}

/// Attach fallbacks and the middleware stack to `routes`.
///
/// Outermost first: tracing, CORS, security headers, request tagging, the
/// centralized error handler, panic capture, then the request scope that
/// tells the panic hook a fault is request-local. Nothing may run between
/// panic capture and the scope.
pub fn layered(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG)),
        )
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(from_fn(request_id::tag_request))
        .layer(from_fn_with_state(
            Arc::clone(&state),
            fallback::error_envelope,
        ))
        .layer(CatchPanicLayer::custom(fallback::panic_response))
        .layer(from_fn(request_id::scope_request));

    routes
        .fallback(fallback::not_found)
        .method_not_allowed_fallback(fallback::not_found)
        .layer(middleware)
        .with_state(state)
}
