//! Stripe webhook handler
//!
//! POST /stripe/webhook: payment intent events (raw body for signature verification)
//!
//! Returning 5xx makes Stripe redeliver the event. A success event answers
//! 500 until its attempt is recorded, including one that arrives after the
//! attempt was closed as failed. Failure events are acknowledged once the
//! ledger has them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};

use crate::checkout::CheckoutError;
use crate::checkout::intent::attempt_id_of;
use crate::state::AppState;
use crate::stripe::{self, PaymentIntent};

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Handle incoming Stripe webhook events
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return AppError::with_message(
            ErrorCode::InvalidWebhookSignature,
            "Missing Stripe-Signature header",
        )
        .into_response();
    };

    if let Err(e) =
        stripe::verify_webhook_signature(&body, sig_header, &state.stripe_webhook_secret)
    {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return AppError::new(ErrorCode::InvalidWebhookSignature).into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return AppError::invalid_request("Malformed webhook event").into_response();
        }
    };
    tracing::info!(event_id = %event.id, event_type = %event.kind, "Received Stripe webhook");

    match event.kind.as_str() {
        "payment_intent.succeeded"
        | "payment_intent.payment_failed"
        | "payment_intent.canceled" => {}
        _ => {
            tracing::debug!(event_type = %event.kind, "Unhandled webhook event type");
            return StatusCode::OK.into_response();
        }
    }

    let intent: PaymentIntent = match serde_json::from_value(event.data.object) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!(event_id = %event.id, %e, "Webhook payload is not a payment intent");
            return AppError::invalid_request("Webhook payload is not a payment intent")
                .into_response();
        }
    };
    let Some(attempt_id) = attempt_id_of(&intent) else {
        tracing::debug!(payment_intent = %intent.id, "Intent has no checkout attempt, ignoring");
        return StatusCode::OK.into_response();
    };

    let status = match event.kind.as_str() {
        "payment_intent.succeeded" => handle_succeeded(&state, attempt_id, &intent).await,
        _ => handle_failed(&state, attempt_id, &intent).await,
    };
    status.into_response()
}

/// payment_intent.succeeded → record the order if the checkout request did not
async fn handle_succeeded(state: &AppState, attempt_id: &str, intent: &PaymentIntent) -> StatusCode {
    match state.checkout.reconcile(attempt_id).await {
        Ok(outcome) => {
            tracing::info!(
                attempt_id,
                order_id = outcome.order_id,
                payment_intent = %intent.id,
                "Webhook reconciled payment"
            );
            StatusCode::OK
        }
        Err(CheckoutError::AttemptNotFound(_)) => {
            tracing::error!(
                attempt_id,
                payment_intent = %intent.id,
                "Payment succeeded for an unknown checkout attempt"
            );
            StatusCode::OK
        }
        // Already dead-lettered with an alert; redelivery cannot change the amount
        Err(e @ CheckoutError::PaymentAmountMismatch { .. }) => {
            tracing::warn!(attempt_id, payment_intent = %intent.id, error = %e, "Webhook reconciliation skipped");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(attempt_id, payment_intent = %intent.id, error = %e, "Webhook reconciliation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// payment_intent.payment_failed / canceled → close the attempt as failed
async fn handle_failed(state: &AppState, attempt_id: &str, intent: &PaymentIntent) -> StatusCode {
    let reason = intent
        .decline_message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("payment {}", intent.status));

    match state.checkout.fail_attempt(attempt_id, &reason).await {
        Ok(_) => StatusCode::OK,
        Err(CheckoutError::AttemptNotFound(_)) => {
            tracing::warn!(attempt_id, "Failure event for unknown checkout attempt");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(attempt_id, error = %e, "Failed to record payment failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
