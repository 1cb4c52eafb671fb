//! Copperleaf storefront library.
//!
//! Headless storefront server in front of a GraphQL commerce backend: a
//! per-shopper cart store, the checkout orchestrator, payment gateway
//! adapters and the off-site payment confirmation poller. The binary in
//! `main.rs` adds Sentry and the listener; everything else lives here so the
//! integration tests can drive the full router in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod commerce;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::commerce::ProductQuery;
use crate::state::AppState;

/// Directory served under `/static`, relative to the working directory.
pub const STATIC_DIR: &str = "crates/storefront/static";

/// Build the storefront router.
///
/// # Middleware Order (outermost first)
///
/// 1. `TraceLayer` (request span with `request_id` and `shopper_id` fields)
/// 2. Request ID
/// 3. Session layer (storefront routes only)
/// 4. Shopper binding (storefront routes only)
///
/// Sentry layers are added by the binary around the returned router.
pub fn app(state: AppState) -> Router {
    let storefront = routes::routes()
        .layer(from_fn_with_state(
            state.clone(),
            middleware::shopper_middleware,
        ))
        .layer(middleware::create_session_layer(state.config()));

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(storefront)
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                shopper_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies the commerce backend answers a one-product catalog query.
/// Returns 503 Service Unavailable if it does not.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let probe = ProductQuery {
        first: 1,
        ..ProductQuery::default()
    };
    match state.catalog().products(&probe).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
