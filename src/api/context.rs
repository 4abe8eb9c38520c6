//! Typed per-request context handed to every handler

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use crate::lifecycle::SwapService;
use crate::metrics::Metrics;
use crate::observability::{CorrelationId, TraceContext};

/// Header a caller may use to supply its own correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Shared, read-only state every handler sees
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SwapService>,
    pub metrics: Arc<Metrics>,
    /// Bearer tokens accepted on the swap routes
    pub api_tokens: Arc<HashSet<String>>,
}

/// Trace context for the request
///
/// Reuses the caller's `x-correlation-id` when present so their logs and
/// ours line up; otherwise a fresh id is generated.
pub struct RequestTrace(pub TraceContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestTrace {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let operation = format!("{} {}", parts.method, parts.uri.path());
        let supplied = parts
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128);
        let trace = match supplied {
            Some(id) => TraceContext::with_correlation(&operation, CorrelationId::from(id)),
            None => TraceContext::new(&operation),
        };
        Ok(Self(trace))
    }
}
