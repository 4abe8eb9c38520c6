//! Route handlers
//!
//! Each handler decodes the JSON body, calls into the [`SwapService`] and maps
//! the result (or the typed [`SwapError`]) to a response.
//!
//! [`SwapService`]: crate::lifecycle::SwapService
//! [`SwapError`]: crate::tx_builder::SwapError

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::api::context::{AppState, RequestTrace};
use crate::api::error::ApiError;
use crate::lifecycle::{BuildByIdParams, QuoteParams, SwapResponse};
use crate::quote::Quote;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct QuoteEnvelope {
    pub quote: Quote,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// `POST /swaps/quote`
pub async fn create_quote(
    State(st): State<AppState>,
    RequestTrace(trace): RequestTrace,
    body: Result<Json<QuoteParams>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<QuoteEnvelope>)> {
    let Json(params) = body?;
    let quote = st.service.get_and_store_quote(&params, &trace).await?;
    Ok((StatusCode::CREATED, Json(QuoteEnvelope { quote })))
}

/// `POST /swaps/build`
pub async fn build_by_id(
    State(st): State<AppState>,
    RequestTrace(trace): RequestTrace,
    body: Result<Json<BuildByIdParams>, JsonRejection>,
) -> ApiResult<Json<SwapResponse>> {
    let Json(params) = body?;
    Ok(Json(st.service.build_swap(&params, &trace).await?))
}

/// `POST /swaps/transactions`
pub async fn build_fresh(
    State(st): State<AppState>,
    RequestTrace(trace): RequestTrace,
    body: Result<Json<QuoteParams>, JsonRejection>,
) -> ApiResult<Json<SwapResponse>> {
    let Json(params) = body?;
    Ok(Json(st.service.build_swap_fresh(&params, &trace).await?))
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(st): State<AppState>) -> Response {
    match st.metrics.encode_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "metrics unavailable",
            )
            .into_response()
        }
    }
}
