//! Bearer-token middleware for the swap routes

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::api::context::AppState;
use crate::api::error::ApiError;

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Constant-time membership check; an empty token set admits nobody
pub fn token_accepted<'a>(
    presented: &str,
    accepted: impl IntoIterator<Item = &'a String>,
) -> bool {
    accepted
        .into_iter()
        .fold(false, |hit, token| {
            hit | bool::from(token.as_bytes().ct_eq(presented.as_bytes()))
        })
}

/// Reject the request unless it carries a configured bearer token
pub async fn require_bearer(State(st): State<AppState>, req: Request, next: Next) -> Response {
    let ok = bearer_token(req.headers())
        .map(|token| token_accepted(token, st.api_tokens.iter()))
        .unwrap_or(false);
    if !ok {
        debug!(path = %req.uri().path(), "Request rejected without a valid bearer token");
        return ApiError::unauthorized().into_response();
    }
    next.run(req).await
}
