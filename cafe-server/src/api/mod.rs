//! API routes for cafe-server

pub mod admin;
pub mod checkout;
pub mod health;
pub mod stripe_webhook;

use crate::auth::admin_auth_middleware;
use crate::auth::rate_limit::{checkout_rate_limit, login_rate_limit};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::{Router, middleware};
use http::{HeaderName, HeaderValue};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Checkouts in flight at once; each may hold a processor call open
const MAX_CONCURRENT_CHECKOUTS: usize = 64;

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Public checkout (rate limited per IP)
    let checkout = Router::new()
        .route("/api/checkout", post(checkout::checkout))
        .route("/api/checkout/intent", post(checkout::create_intent))
        .route("/api/checkout/confirm-order", post(checkout::confirm_order))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_CHECKOUTS))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            checkout_rate_limit,
        ));

    let login = Router::new()
        .route("/api/admin/login", post(admin::login))
        .layer(middleware::from_fn_with_state(state.clone(), login_rate_limit));

    // Admin (JWT authenticated)
    let admin = Router::new()
        .route("/api/admin/reconciliation", get(admin::list_unreconciled))
        .route(
            "/api/admin/reconciliation/{attempt_id}/replay",
            post(admin::replay),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(checkout)
        .merge(login)
        .merge(admin)
        .merge(webhook)
        // Storefront runs on another origin
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            XRequestId,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .with_state(state)
}
