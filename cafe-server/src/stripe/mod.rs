//! Stripe integration via REST API (no SDK dependency)
//!
//! - [`PaymentGateway`]: the seam the checkout core talks to
//! - [`StripeGateway`]: reqwest implementation against `/v1/payment_intents`
//! - [`verify_webhook_signature`]: `Stripe-Signature` header verification

mod client;

pub use client::StripeGateway;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

/// Reject webhook events signed more than 5 minutes ago (or ahead)
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

// ============================================================================
// Payment intents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
    Failed,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// The processor is still working on it; polling may change the answer
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// The charge did not and will not go through without a new payment method
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::RequiresPaymentMethod | Self::Canceled | Self::Failed
        )
    }
}

impl std::fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor-side error attached to an intent after a failed confirmation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payment intent as returned by the processor (external entity, never owned)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: PaymentIntentStatus,
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntent {
    /// User-facing decline reason, if the processor gave one
    pub fn decline_message(&self) -> Option<&str> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.as_deref())
    }
}

/// Parameters for creating an intent
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntent {
    pub amount_minor: i64,
    pub currency: String,
    /// Flat string pairs sent as `metadata[key]=value`
    pub metadata: Vec<(String, String)>,
    pub receipt_email: Option<String>,
    pub description: Option<String>,
}

/// Parameters for a server-side confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmIntent {
    /// Payment method id created by the browser (`pm_...`)
    pub payment_method: String,
    pub receipt_email: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure or unreadable body
    #[error("Payment processor request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor refused the card (HTTP 402, `card_error`)
    #[error("{message}")]
    CardDeclined {
        code: Option<String>,
        decline_code: Option<String>,
        message: String,
    },

    /// Any other non-2xx response, with the processor's diagnostic body
    #[error("Payment processor returned {status}: {message}")]
    Api {
        status: u16,
        kind: Option<String>,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid payment processor response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Gateway trait
// ============================================================================

/// Payment processor operations used by checkout
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an intent. `idempotency_key` makes a retried call return the
    /// original intent instead of reserving a second charge.
    async fn create_intent(
        &self,
        request: &CreateIntent,
        idempotency_key: &str,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Confirm an intent with a payment method created client-side
    async fn confirm_intent(
        &self,
        intent_id: &str,
        request: &ConfirmIntent,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    /// Cancel an unpaid intent so its client secret can no longer be used
    async fn cancel_intent(&self, intent_id: &str, reason: &str)
    -> Result<PaymentIntent, GatewayError>;
}

// ============================================================================
// Webhook signature
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid Stripe-Signature header")]
    MalformedHeader,
    #[error("Invalid signature hex")]
    InvalidHex,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Webhook signature mismatch")]
    Mismatch,
    #[error("Webhook timestamp outside tolerance")]
    Expired,
    #[error("HMAC key error")]
    InvalidKey,
}

fn signature_mac(
    secret: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<Hmac<Sha256>, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex signature Stripe would send for `payload` at `timestamp`
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let mac = signature_mac(secret, &timestamp.to_string(), payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify Stripe webhook signature (HMAC-SHA256) against the current time
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    verify_webhook_signature_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

/// Verify Stripe webhook signature at a given unix time
///
/// The header may carry several `v1=` entries during secret rotation; any one
/// matching is enough.
pub fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let mut matched = false;
    for signature in signatures {
        let sig_bytes = hex::decode(signature).map_err(|_| SignatureError::InvalidHex)?;
        // Constant-time comparison via hmac::verify_slice
        if signature_mac(secret, timestamp, payload)?
            .verify_slice(&sig_bytes)
            .is_ok()
        {
            matched = true;
            break;
        }
    }
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    // Reject replays of old events
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    Ok(())
}
