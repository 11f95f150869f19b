//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderName, HeaderValue, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{callback, health, history, payments, verify};
use crate::rate_limit;
use crate::state::AppState;

/// Maximum concurrent requests for `/api` endpoints.
/// Each one may hold a provider connection for up to the provider timeout.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## API (rate limited per client)
/// - `GET /api/payment-channels` - Channels of the active provider
/// - `POST /api/create-transaction` - Start a premium purchase
/// - `GET /api/transaction-status/:reference` - Poll and reconcile
/// - `POST /api/payment-history` - Paginated ledger history
/// - `POST /api/verify-user` - Confirm a user or group is known
///
/// ## Provider
/// - `POST /callback` - Provider notifications (not rate limited)
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        .route("/payment-channels", get(payments::list_channels))
        .route("/create-transaction", post(payments::create_transaction))
        .route(
            "/transaction-status/:reference",
            get(payments::transaction_status),
        )
        .route("/payment-history", post(history::payment_history))
        .route("/verify-user", post(verify::verify_user))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .layer(from_fn_with_state(state.clone(), rate_limit::limit));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        .route("/callback", post(callback::callback))
        // Global middleware
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
