//! HTTP boundary
//!
//! - **context**: shared state and the typed per-request trace
//! - **auth**: bearer-token middleware
//! - **handlers**: one function per route
//! - **error**: JSON error responses
//! - **server**: bind and serve
//!
//! The route table is [`router`]: swap routes sit behind [`auth::require_bearer`],
//! `/health` and `/metrics` are open.

pub mod auth;
pub mod context;
pub mod error;
pub mod handlers;
pub mod server;

pub use context::{AppState, RequestTrace};
pub use error::ApiError;
pub use server::{endpoint_server, serve};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let swap_routes = Router::new()
        .route("/swaps/quote", post(handlers::create_quote))
        .route("/swaps/build", post(handlers::build_by_id))
        .route("/swaps/transactions", post(handlers::build_fresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let open_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics));

    Router::new()
        .merge(swap_routes)
        .merge(open_routes)
        .fallback(|| async {
            ApiError::new(axum::http::StatusCode::NOT_FOUND, "not_found", "no such route")
        })
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
