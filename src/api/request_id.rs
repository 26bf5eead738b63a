//! Request tagging middleware.
//!
//! Every inbound request is assigned a correlation id before any handler runs.
//! The id is:
//!
//! - Accepted from the caller if they already send a sane `X-Request-ID`
//! - Freshly generated (UUID v4, 32 hex characters) otherwise
//! - Stored in a [`RequestContext`] request extension for handlers to read
//! - Logged once, with method, path, and client address, as the request arrives
//! - Logged again with status, size, and latency once the response is final
//!   (the access log; `/health` and `/ready` polls are skipped)
//! - Echoed back in the `X-Request-ID` response header
//! - Attached to a [`tracing`] span so every log line for the request carries it

use std::{convert::Infallible, net::SocketAddr, time::Instant};

use axum::{
    body::HttpBody as _,
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, HeaderValue, Method, Uri},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, Instrument as _};
use uuid::Uuid;

use crate::fatal;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id we will echo back.
const MAX_INBOUND_ID_LEN: usize = 128;

/// Per-request correlation data, created once by [`tag_request`].
///
/// Usable directly as an extractor:
/// ```rust,ignore
/// async fn handler(ctx: RequestContext) { ... }
/// ```
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub method: Method,
    /// Path plus query string, as requested.
    pub path: String,
    pub client: Option<SocketAddr>,
}

impl RequestContext {
    fn new(id: String, method: Method, uri: &Uri, client: Option<SocketAddr>) -> Self {
        let path = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_owned(), |pq| pq.as_str().to_owned());
        Self {
            id,
            received_at: Utc::now(),
            method,
            path,
            client,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    /// Reads the tagged context; untagged requests get a fresh one so an id is
    /// always available.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| {
                RequestContext::new(generate_id(), parts.method.clone(), &parts.uri, None)
            }))
    }
}

/// A fresh 32-character alphanumeric id.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn inbound_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| {
            !v.is_empty() && v.len() <= MAX_INBOUND_ID_LEN && v.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(String::from)
}

/// Axum middleware that assigns a [`RequestContext`] to every request.
///
/// Apply this **inside** `tower_http::TraceLayer` and outside every layer
/// that renders a body. Once the response is final it writes the access log
/// line, except for orchestrator probe traffic.
pub async fn tag_request(mut req: Request, next: Next) -> Response {
    let id = inbound_id(req.headers()).unwrap_or_else(generate_id);
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0);
    let ctx = RequestContext::new(id.clone(), req.method().clone(), req.uri(), client);
    let probe = is_probe(req.uri().path());

    info!(
        request_id = %ctx.id,
        received_at = %ctx.received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        method = %ctx.method,
        path = %ctx.path,
        client = %client_label(ctx.client),
        "request received"
    );
    req.extensions_mut().insert(ctx.clone());

    let started = Instant::now();
    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    if !probe {
        let bytes = response.body().size_hint().exact();
        info!(
            request_id = %ctx.id,
            method = %ctx.method,
            path = %ctx.path,
            client = %client_label(ctx.client),
            status = response.status().as_u16(),
            bytes = %bytes.map_or_else(|| "-".to_string(), |n| n.to_string()),
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
    }

    response
}

/// Innermost middleware: marks everything below it as request-local work for
/// [`fatal`], so a handler panic is left to `CatchPanicLayer`.
///
/// Must sit directly inside the catch-panic layer. A panic above it is
/// outside any request scope and therefore fatal.
pub async fn scope_request(ctx: RequestContext, req: Request, next: Next) -> Response {
    fatal::within_request(ctx.id, next.run(req)).await
}

/// Liveness and readiness polls are left out of the access log.
fn is_probe(path: &str) -> bool {
    matches!(path, "/health" | "/ready")
}

fn client_label(client: Option<SocketAddr>) -> String {
    client.map_or_else(|| "-".to_string(), |c| c.to_string())
}
