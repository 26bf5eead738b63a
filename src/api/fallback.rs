//! Not-found handling and the centralized error handler.

use std::{any::Any, sync::Arc};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use super::{request_id::RequestContext, AppState};
use crate::{
    error::{AppError, ErrorEnvelope, Failure},
    fatal,
};

/// Fallback for any path, or path + method pair, with no declared endpoint.
pub async fn not_found(ctx: RequestContext) -> Response {
    warn!(request_id = %ctx.id, method = %ctx.method, path = %ctx.path, "route not found");
    let envelope = ErrorEnvelope::new(
        StatusCode::NOT_FOUND,
        format!("The requested resource {} was not found", ctx.path),
        Some(ctx.id),
    );
    (StatusCode::NOT_FOUND, Json(envelope)).into_response()
}

/// Converts every [`Failure`]-tagged response into an [`ErrorEnvelope`].
///
/// The full error chain is always logged here; the caller only sees the
/// top-level message, and only outside production.
pub async fn error_envelope(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.id.clone());

    let response = next.run(req).await;
    let Some(failure) = response.extensions().get::<Failure>().cloned() else {
        return response;
    };

    error!(
        request_id = request_id.as_deref().unwrap_or("-"),
        status = failure.status.as_u16(),
        error = %failure.detail,
        "request failed"
    );

    let envelope = ErrorEnvelope::for_failure(&failure, state.config.is_production(), request_id);
    (failure.status, Json(envelope)).into_response()
}

/// `CatchPanicLayer` hook: a handler panic becomes an ordinary 500 failure.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = fatal::panic_message(payload.as_ref());
    AppError::from(anyhow::anyhow!("handler panicked: {message}")).into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::{
        api::test_support::{app_with_failures, body_json, get, header, send, state},
        error::GENERIC_MESSAGE,
    };

    // -----------------------------------------------------------------------
    // Not found
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_path_returns_404_naming_the_path() {
        let resp = get(app_with_failures(state("development")), "/nope").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let id = header(&resp, "x-request-id");

        let json = body_json(resp).await;
        assert_eq!(json["error"], "Not Found");
        assert!(json["message"].as_str().unwrap().contains("/nope"));
        assert_eq!(json["request_id"], id.as_str());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unsupported_method_on_known_path_is_a_routing_miss() {
        let resp = send(app_with_failures(state("development")), "POST", "/health").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert!(json["message"].as_str().unwrap().contains("/health"));
    }

    #[tokio::test]
    async fn not_found_message_keeps_query_string() {
        let resp = get(app_with_failures(state("production")), "/missing?x=1").await;
        let json = body_json(resp).await;
        assert_eq!(
            json["message"],
            "The requested resource /missing?x=1 was not found"
        );
    }

    // -----------------------------------------------------------------------
    // Centralized error handler
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn failure_without_status_is_500_with_detail_in_development() {
        let resp = get(app_with_failures(state("development")), "/boom").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let id = header(&resp, "x-request-id");

        let json = body_json(resp).await;
        assert_eq!(json["error"], "Internal Server Error");
        assert_eq!(json["message"], "cache shard 3 exploded");
        assert_eq!(json["request_id"], id.as_str());
    }

    #[tokio::test]
    async fn production_hides_internal_text() {
        let resp = get(app_with_failures(state("production")), "/boom").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["message"], GENERIC_MESSAGE);
        assert!(!body.to_string().contains("shard"));
    }

    #[tokio::test]
    async fn failure_status_is_preserved() {
        let resp = get(app_with_failures(state("development")), "/teapot").await;
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "I'm a teapot");
        assert_eq!(json["message"], "short and stout");
    }

    #[tokio::test]
    async fn handler_panic_becomes_500_envelope() {
        let resp = get(app_with_failures(state("development")), "/panic").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let id = header(&resp, "x-request-id");

        let json = body_json(resp).await;
        assert_eq!(json["request_id"], id.as_str());
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("invariant broken"));
    }

    #[tokio::test]
    async fn handler_panic_is_redacted_in_production() {
        let resp = get(app_with_failures(state("production")), "/panic").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["message"], GENERIC_MESSAGE);
    }
}
