//! Unified HTTP error type for axum request handlers.
//!
//! [`AppError`] wraps [`anyhow::Error`] plus an optional status code. Handlers
//! return `Result<T, AppError>` and propagate errors with `?`.
//!
//! Rendering is split in two. [`AppError::into_response`] only produces a bare
//! response tagged with a [`Failure`] extension; the centralized error
//! middleware ([`crate::api::fallback::error_envelope`]) picks that up, logs the
//! full detail, and writes the [`ErrorEnvelope`] the caller sees. This keeps the
//! request id and the production redaction rule in one place.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn my_handler() -> Result<Json<Value>, AppError> {
//!     let value = some_fallible_operation().await?;
//!     Ok(Json(value))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Message returned in place of internal error text in production.
pub const GENERIC_MESSAGE: &str = "Something went wrong!";

/// Wraps [`anyhow::Error`] so it can be returned from axum handlers.
///
/// Any type that implements `Into<anyhow::Error>` converts via the blanket
/// [`From`] impl and maps to 500. Use [`AppError::with_status`] when the
/// failure carries its own status.
#[derive(Debug)]
pub struct AppError {
    status: Option<StatusCode>,
    source: anyhow::Error,
}

impl AppError {
    /// Attach an explicit HTTP status to a failure.
    pub fn with_status(status: StatusCode, source: impl Into<anyhow::Error>) -> Self {
        Self {
            status: Some(status),
            source: source.into(),
        }
    }

    /// Status carried by the failure, or 500 when it has none.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = Failure {
            status: self.status(),
            message: self.source.to_string(),
            detail: format!("{:?}", self.source),
        };
        let mut response = failure.status.into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

/// Convert any `Into<anyhow::Error>` into an [`AppError`].
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self {
            status: None,
            source: e.into(),
        }
    }
}

/// A handler failure in flight between the handler and the error middleware.
#[derive(Debug, Clone)]
pub struct Failure {
    pub status: StatusCode,
    /// Top-level error text. Only ever shown outside production.
    pub message: String,
    /// Full error chain, for server-side logs only.
    pub detail: String,
}

/// Uniform body for every non-success response the service emits.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub timestamp: String,
    pub request_id: Option<String>,
}

impl ErrorEnvelope {
    /// Build an envelope whose category is the canonical reason phrase of `status`.
    pub fn new(status: StatusCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_owned(),
            message: message.into(),
            timestamp: crate::api::timestamp(),
            request_id,
        }
    }

    /// Envelope for a handler failure, redacting the message when `production`.
    pub fn for_failure(failure: &Failure, production: bool, request_id: Option<String>) -> Self {
        let message = if production {
            GENERIC_MESSAGE.to_owned()
        } else {
            failure.message.clone()
        };
        Self::new(failure.status, message, request_id)
    }
}
