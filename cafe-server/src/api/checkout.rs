//! Checkout endpoints
//!
//! - `POST /api/checkout`: full chain in one request
//! - `POST /api/checkout/intent`: two-step flow, create the intent
//! - `POST /api/checkout/confirm-order`: two-step flow, record after the
//!   browser confirmed the card

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use shared::checkout::{
    CheckoutOutcome, CheckoutRequest, ConfirmOrderRequest, IntentRequest, IntentTicket,
};
use shared::error::{ApiResponse, AppResult};

use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutOutcome>>> {
    let outcome = state
        .checkout
        .checkout(&request, idempotency_key(&headers))
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn create_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IntentRequest>,
) -> AppResult<Json<ApiResponse<IntentTicket>>> {
    let ticket = state
        .checkout
        .begin(&request, idempotency_key(&headers))
        .await?;
    Ok(Json(ApiResponse::success(ticket)))
}

pub async fn confirm_order(
    State(state): State<AppState>,
    Json(request): Json<ConfirmOrderRequest>,
) -> AppResult<Json<ApiResponse<CheckoutOutcome>>> {
    let outcome = state.checkout.complete(&request.attempt_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
