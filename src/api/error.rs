//! JSON error responses
//!
//! Every failure leaves the API as `{"error": {category, message, retryable}}`
//! with the status its category maps to. Internal and upstream failures get a
//! fixed message; their detail stays in the service logs.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::tx_builder::SwapError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub category: &'static str,
    pub message: String,
    pub retryable: bool,
}

/// An error on its way out of a handler or middleware
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: ErrorDetail,
}

impl ApiError {
    pub fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            detail: ErrorDetail {
                category,
                message: message.into(),
                retryable: false,
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        )
    }
}

impl From<SwapError> for ApiError {
    fn from(err: SwapError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            detail: ErrorDetail {
                category: err.category(),
                message: client_message(&err),
                retryable: err.is_retryable(),
            },
        }
    }
}

fn client_message(err: &SwapError) -> String {
    match err {
        SwapError::Internal(_) => "internal error".to_string(),
        SwapError::Upstream {
            service,
            timed_out: true,
            ..
        } => format!("{service} timed out"),
        SwapError::Upstream { service, .. } => format!("{service} unavailable"),
        other => other.to_string(),
    }
}

/// Malformed or mistyped request bodies are validation failures
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, "validation", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.detail })).into_response()
    }
}
