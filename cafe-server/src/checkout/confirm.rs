//! Payment confirmation
//!
//! Confirmation is the only step that can take human time (card
//! authentication). From the orchestrator's side it is one blocking call that
//! ends in a terminal status or an error; only `succeeded` lets the flow
//! continue to persistence.

use std::time::Duration;

use super::CheckoutError;
use crate::stripe::{ConfirmIntent, GatewayError, PaymentGateway, PaymentIntent, PaymentIntentStatus};

/// How long to wait for an intent that is still `processing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Confirm `intent_id` with the given payment method and wait for the outcome
pub async fn confirm_payment(
    gateway: &dyn PaymentGateway,
    intent_id: &str,
    request: &ConfirmIntent,
    policy: ConfirmPolicy,
) -> Result<PaymentIntent, CheckoutError> {
    let intent = match gateway.confirm_intent(intent_id, request).await {
        Ok(intent) => intent,
        Err(GatewayError::CardDeclined { message, .. }) => {
            return Err(CheckoutError::PaymentDeclined {
                status: None,
                message,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let intent = await_settled(gateway, intent, policy).await?;
    require_succeeded(&intent)?;
    Ok(intent)
}

/// Re-read the intent while the processor still reports it in flight
pub async fn await_settled(
    gateway: &dyn PaymentGateway,
    mut intent: PaymentIntent,
    policy: ConfirmPolicy,
) -> Result<PaymentIntent, CheckoutError> {
    let mut polls = 0;
    while intent.status.is_in_flight() && polls < policy.poll_attempts {
        tokio::time::sleep(policy.poll_interval).await;
        intent = gateway.retrieve_intent(&intent.id).await?;
        polls += 1;
    }
    Ok(intent)
}

/// Whether the intent ended in a failure rather than waiting on the customer.
///
/// `requires_payment_method` is also the status of an intent nobody has
/// confirmed yet; it only counts as a decline once the processor attached an
/// error to it.
fn is_declined(intent: &PaymentIntent) -> bool {
    match intent.status {
        PaymentIntentStatus::RequiresPaymentMethod => intent.last_payment_error.is_some(),
        status => status.is_failure(),
    }
}

/// Gate: anything other than `succeeded` stops the flow
pub fn require_succeeded(intent: &PaymentIntent) -> Result<(), CheckoutError> {
    match intent.status {
        PaymentIntentStatus::Succeeded => Ok(()),
        status if is_declined(intent) => {
            let message = intent
                .decline_message()
                .map(str::to_string)
                .unwrap_or_else(|| match status {
                    PaymentIntentStatus::Canceled => "Payment was canceled".to_string(),
                    _ => "Payment was declined".to_string(),
                });
            Err(CheckoutError::PaymentDeclined {
                status: Some(status),
                message,
            })
        }
        status => Err(CheckoutError::PaymentNotCompleted { status }),
    }
}
