//! Reconciliation orchestrator
//!
//! Sequences amount verification, intent creation, confirmation and order
//! recording for one checkout attempt, keeping the ledger entry in step.
//! Work on a given attempt is serialized in-process, so the synchronous
//! request, the webhook and the sweeper never record the same charge twice.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use shared::checkout::{
    CheckoutOutcome, CheckoutRequest, CheckoutSnapshot, IntentRequest, IntentTicket,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::confirm::{self, ConfirmPolicy};
use super::{CheckoutError, CheckoutStage, enter_stage, intent, persist};
use crate::activity::{ActivityAction, ActivityLog};
use crate::store::{
    AttemptPatch, AttemptState, CatalogSource, CheckoutAttempt, NewAttempt, OrderStore,
    ReconciliationLedger, StoreError,
};
use crate::stripe::{ConfirmIntent, PaymentGateway, PaymentIntent, PaymentIntentStatus};

const MIN_IDEMPOTENCY_KEY_LEN: usize = 8;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub delivery_fee: Decimal,
    pub confirm: ConfirmPolicy,
}

/// Per-attempt async locks; idle entries are pruned on each acquire
#[derive(Clone, Default)]
struct AttemptLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AttemptLocks {
    async fn acquire(&self, attempt_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.retain(|_, slot| Arc::strong_count(slot) > 1);
            map.entry(attempt_id.to_owned()).or_default().clone()
        };
        slot.lock_owned().await
    }
}

fn attempt_id_for(idempotency_key: Option<&str>) -> Result<String, CheckoutError> {
    let Some(key) = idempotency_key else {
        return Ok(format!("att_{}", uuid::Uuid::new_v4().simple()));
    };
    let key = key.trim();
    if !(MIN_IDEMPOTENCY_KEY_LEN..=MAX_IDEMPOTENCY_KEY_LEN).contains(&key.len()) {
        return Err(CheckoutError::InvalidIdempotencyKey(format!(
            "must be {MIN_IDEMPOTENCY_KEY_LEN}-{MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CheckoutError::InvalidIdempotencyKey(
            "only letters, digits, '-' and '_' are allowed".into(),
        ));
    }
    Ok(key.to_string())
}

/// A retried attempt must describe the same purchase
fn same_cart(a: &CheckoutSnapshot, b: &CheckoutSnapshot) -> bool {
    a.amount_minor == b.amount_minor
        && a.order_type == b.order_type
        && a.items.len() == b.items.len()
        && a
            .items
            .iter()
            .zip(&b.items)
            .all(|(x, y)| x.menu_item_id == y.menu_item_id && x.quantity == y.quantity)
}

fn outcome_of(attempt: &CheckoutAttempt) -> Result<CheckoutOutcome, CheckoutError> {
    match (attempt.order_id, &attempt.payment_reference) {
        (Some(order_id), Some(reference)) => Ok(CheckoutOutcome {
            success: true,
            order_id,
            attempt_id: attempt.attempt_id.clone(),
            payment_reference: reference.clone(),
        }),
        _ => Err(CheckoutError::invalid_state(
            &attempt.attempt_id,
            attempt.state,
            "recorded attempt is missing its order reference",
        )),
    }
}

pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogSource>,
    ledger: Arc<dyn ReconciliationLedger>,
    activity: ActivityLog,
    settings: CheckoutSettings,
    locks: AttemptLocks,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn CatalogSource>,
        ledger: Arc<dyn ReconciliationLedger>,
        activity: ActivityLog,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            gateway,
            orders,
            catalog,
            ledger,
            activity,
            settings,
            locks: AttemptLocks::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn ReconciliationLedger> {
        &self.ledger
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Full chain in one call: validate, create intent, confirm, record.
    ///
    /// Replaying the same idempotency key returns the recorded outcome, or
    /// resumes the attempt where it stopped.
    pub async fn checkout(
        &self,
        request: &CheckoutRequest,
        idempotency_key: Option<&str>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let attempt_id = attempt_id_for(idempotency_key)?;
        enter_stage(&attempt_id, CheckoutStage::Init);
        let snapshot = self.snapshot(&request.order).await?;
        enter_stage(&attempt_id, CheckoutStage::AmountOk);

        let _guard = self.locks.acquire(&attempt_id).await;
        let attempt = self.open_attempt(&attempt_id, snapshot).await?;
        match attempt.state {
            AttemptState::Initiated => {}
            AttemptState::Recorded => return outcome_of(&attempt),
            // A failed attempt is only reopened by a success at the processor
            AttemptState::Charged | AttemptState::DeadLetter | AttemptState::Failed => {
                return self.reconcile_locked(attempt).await;
            }
        }

        let intent = self.ensure_intent(&attempt).await?;
        enter_stage(&attempt_id, CheckoutStage::IntentCreated);

        let confirmed = if intent.status == PaymentIntentStatus::Succeeded
            || intent.status.is_in_flight()
        {
            // An earlier confirmation reached the processor but its response was lost
            self.settled(intent).await
        } else {
            let confirm_request = ConfirmIntent {
                payment_method: request.payment_method.clone(),
                receipt_email: request.billing.as_ref().and_then(|b| b.email.clone()),
            };
            confirm::confirm_payment(
                self.gateway.as_ref(),
                &intent.id,
                &confirm_request,
                self.settings.confirm,
            )
            .await
        };
        let intent = match confirmed {
            Ok(intent) => intent,
            Err(err) => {
                self.payment_failed(&attempt, &err).await;
                return Err(err);
            }
        };

        self.settle(attempt, &intent).await
    }

    /// Two-step flow, part one: validate and create the intent the browser
    /// will confirm with its client secret.
    pub async fn begin(
        &self,
        request: &IntentRequest,
        idempotency_key: Option<&str>,
    ) -> Result<IntentTicket, CheckoutError> {
        let attempt_id = attempt_id_for(idempotency_key)?;
        enter_stage(&attempt_id, CheckoutStage::Init);
        let snapshot = self.snapshot(request).await?;
        enter_stage(&attempt_id, CheckoutStage::AmountOk);

        let _guard = self.locks.acquire(&attempt_id).await;
        let attempt = self.open_attempt(&attempt_id, snapshot).await?;
        if attempt.state != AttemptState::Initiated {
            return Err(CheckoutError::invalid_state(
                &attempt_id,
                attempt.state,
                "checkout has already been processed",
            ));
        }

        let intent = self.ensure_intent(&attempt).await?;
        enter_stage(&attempt_id, CheckoutStage::IntentCreated);

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            CheckoutError::PaymentGateway(crate::stripe::GatewayError::InvalidResponse(
                "intent has no client secret".into(),
            ))
        })?;
        Ok(IntentTicket {
            attempt_id,
            payment_intent_id: intent.id,
            client_secret,
            amount: attempt.snapshot.total_amount,
            amount_minor: attempt.snapshot.amount_minor,
            currency: attempt.snapshot.currency,
        })
    }

    /// Two-step flow, part two: the browser reports confirmation; the intent
    /// is re-read from the processor and the order written from the ledger
    /// snapshot.
    pub async fn complete(&self, attempt_id: &str) -> Result<CheckoutOutcome, CheckoutError> {
        self.reconcile(attempt_id).await
    }

    /// Bring an attempt to `recorded` if its payment succeeded.
    ///
    /// Used by the two-step completion, the webhook, the sweeper and admin
    /// replays. Already-recorded attempts return their outcome unchanged.
    pub async fn reconcile(&self, attempt_id: &str) -> Result<CheckoutOutcome, CheckoutError> {
        let _guard = self.locks.acquire(attempt_id).await;
        let attempt = self.load(attempt_id).await?;
        self.reconcile_locked(attempt).await
    }

    /// Mark an attempt failed after the processor reported a failed or
    /// canceled payment. Only `initiated` attempts are affected.
    ///
    /// The intent stays payable after a decline, so a later success still
    /// reconciles the attempt.
    pub async fn fail_attempt(&self, attempt_id: &str, reason: &str) -> Result<bool, CheckoutError> {
        let _guard = self.locks.acquire(attempt_id).await;
        let attempt = self.load(attempt_id).await?;
        if attempt.state != AttemptState::Initiated {
            tracing::debug!(
                attempt_id,
                state = %attempt.state,
                "Ignoring payment failure for attempt past initiation"
            );
            return Ok(false);
        }
        self.ledger
            .update(
                attempt_id,
                &AttemptPatch::state(AttemptState::Failed).last_error(reason),
            )
            .await
            .map_err(CheckoutError::Ledger)?;
        enter_stage(attempt_id, CheckoutStage::PaymentFailed);
        Ok(true)
    }

    /// Close an attempt nobody finished paying.
    ///
    /// The intent is canceled first so its client secret can no longer be
    /// charged; a declined (`failed`) attempt only has its intent canceled.
    /// If the payment went through in the meantime the attempt stays open
    /// for the next reconcile.
    pub async fn abandon(&self, attempt_id: &str) -> Result<bool, CheckoutError> {
        let _guard = self.locks.acquire(attempt_id).await;
        let attempt = self.load(attempt_id).await?;
        if !matches!(attempt.state, AttemptState::Initiated | AttemptState::Failed) {
            return Ok(false);
        }

        if let Some(reference) = &attempt.payment_reference {
            let intent = self.gateway.retrieve_intent(reference).await?;
            if intent.status == PaymentIntentStatus::Succeeded {
                return Ok(false);
            }
            if intent.status != PaymentIntentStatus::Canceled {
                self.gateway.cancel_intent(reference, "abandoned").await?;
                tracing::info!(attempt_id, payment_reference = %reference, "Canceled abandoned payment intent");
            }
        }
        if attempt.state == AttemptState::Failed {
            return Ok(true);
        }

        self.ledger
            .update(
                attempt_id,
                &AttemptPatch::state(AttemptState::Failed)
                    .last_error("abandoned before payment completed"),
            )
            .await
            .map_err(CheckoutError::Ledger)?;
        enter_stage(attempt_id, CheckoutStage::PaymentFailed);
        Ok(true)
    }

    /// Stop automatic replays for a `charged` attempt and raise an alert.
    ///
    /// The row is re-read under the attempt lock; anything no longer
    /// `charged` (recorded by a webhook or operator meanwhile) is left alone.
    pub async fn dead_letter(&self, attempt_id: &str) -> Result<bool, CheckoutError> {
        let _guard = self.locks.acquire(attempt_id).await;
        let attempt = self.load(attempt_id).await?;
        if attempt.state != AttemptState::Charged {
            tracing::debug!(attempt_id, state = %attempt.state, "Attempt settled before dead-lettering");
            return Ok(false);
        }

        let reason = attempt
            .last_error
            .clone()
            .unwrap_or_else(|| "replays exhausted".to_string());
        tracing::error!(
            attempt_id,
            payment_reference = ?attempt.payment_reference,
            retry_count = attempt.retry_count,
            reason = %reason,
            "Reconciliation replays exhausted, moving attempt to dead letter"
        );
        self.patch_quietly(
            &attempt,
            AttemptPatch::state(AttemptState::DeadLetter).last_error(&reason),
        )
        .await;
        self.alert(ActivityAction::ReconciliationDeadLettered, &attempt, &reason);
        Ok(true)
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn snapshot(&self, request: &IntentRequest) -> Result<CheckoutSnapshot, CheckoutError> {
        intent::price_snapshot(
            self.catalog.as_ref(),
            request,
            self.settings.delivery_fee,
            &self.settings.currency,
        )
        .await
    }

    async fn load(&self, attempt_id: &str) -> Result<CheckoutAttempt, CheckoutError> {
        self.ledger
            .get(attempt_id)
            .await
            .map_err(CheckoutError::Ledger)?
            .ok_or_else(|| CheckoutError::AttemptNotFound(attempt_id.to_string()))
    }

    /// Ledger entry for this attempt, created before any money moves
    async fn open_attempt(
        &self,
        attempt_id: &str,
        snapshot: CheckoutSnapshot,
    ) -> Result<CheckoutAttempt, CheckoutError> {
        let existing = match self.ledger.get(attempt_id).await.map_err(CheckoutError::Ledger)? {
            Some(existing) => existing,
            None => match self.ledger.open(&NewAttempt::new(attempt_id, snapshot.clone())).await {
                Ok(attempt) => return Ok(attempt),
                Err(StoreError::Conflict(_)) => self.load(attempt_id).await?,
                Err(e) => return Err(CheckoutError::Ledger(e)),
            },
        };

        if !same_cart(&existing.snapshot, &snapshot) {
            return Err(CheckoutError::invalid_state(
                attempt_id,
                existing.state,
                "idempotency key was already used for a different cart",
            ));
        }
        tracing::info!(attempt_id, state = %existing.state, "Resuming checkout attempt");
        Ok(existing)
    }

    /// Intent for this attempt: the live one if it was already created,
    /// otherwise a new one.
    ///
    /// A repeated create with the same idempotency key returns the original
    /// creation response, which would hide a confirmation made since.
    async fn ensure_intent(&self, attempt: &CheckoutAttempt) -> Result<PaymentIntent, CheckoutError> {
        let fetched = match &attempt.payment_reference {
            Some(reference) => self
                .gateway
                .retrieve_intent(reference)
                .await
                .map_err(CheckoutError::from),
            None => {
                intent::create_payment_intent(
                    self.gateway.as_ref(),
                    &attempt.attempt_id,
                    &attempt.snapshot,
                )
                .await
            }
        };
        let intent = match fetched {
            Ok(intent) => intent,
            Err(err) => {
                tracing::warn!(attempt_id = %attempt.attempt_id, error = %err, "Intent lookup failed");
                self.patch_quietly(attempt, AttemptPatch::default().last_error(err.to_string()))
                    .await;
                return Err(err);
            }
        };

        if attempt.payment_reference.as_deref() != Some(intent.id.as_str()) {
            self.ledger
                .update(
                    &attempt.attempt_id,
                    &AttemptPatch::default().payment_reference(&intent.id),
                )
                .await
                .map_err(CheckoutError::Ledger)?;
        }
        Ok(intent)
    }

    async fn payment_failed(&self, attempt: &CheckoutAttempt, err: &CheckoutError) {
        enter_stage(&attempt.attempt_id, CheckoutStage::PaymentFailed);
        let patch = match err {
            CheckoutError::PaymentDeclined { .. } => {
                AttemptPatch::state(AttemptState::Failed).last_error(err.to_string())
            }
            // Outcome unknown or pending; leave the attempt open for the
            // webhook or sweeper to settle
            _ => AttemptPatch::default().last_error(err.to_string()),
        };
        self.patch_quietly(attempt, patch).await;
    }

    /// Wait out `processing`, then require `succeeded`
    async fn settled(&self, intent: PaymentIntent) -> Result<PaymentIntent, CheckoutError> {
        let intent =
            confirm::await_settled(self.gateway.as_ref(), intent, self.settings.confirm).await?;
        confirm::require_succeeded(&intent)?;
        Ok(intent)
    }

    async fn reconcile_locked(
        &self,
        attempt: CheckoutAttempt,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if attempt.state == AttemptState::Recorded {
            return outcome_of(&attempt);
        }

        let Some(reference) = attempt.payment_reference.clone() else {
            return Err(CheckoutError::invalid_state(
                &attempt.attempt_id,
                attempt.state,
                "no payment intent has been created for this checkout",
            ));
        };

        let intent = match self.gateway.retrieve_intent(&reference).await {
            Ok(intent) => intent,
            Err(err) => {
                let err = CheckoutError::from(err);
                self.replay_failed(&attempt, &err).await;
                return Err(err);
            }
        };
        let intent = match confirm::await_settled(self.gateway.as_ref(), intent, self.settings.confirm)
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                self.replay_failed(&attempt, &err).await;
                return Err(err);
            }
        };

        if let Err(err) = confirm::require_succeeded(&intent) {
            return match attempt.state {
                AttemptState::Initiated => {
                    self.payment_failed(&attempt, &err).await;
                    Err(err)
                }
                AttemptState::Failed => Err(CheckoutError::invalid_state(
                    &attempt.attempt_id,
                    attempt.state,
                    "payment for this checkout failed, start a new checkout",
                )),
                _ => Err(err),
            };
        }

        if attempt.state == AttemptState::Failed {
            let detail = format!("payment {reference} succeeded after the attempt was closed as failed");
            tracing::error!(
                attempt_id = %attempt.attempt_id,
                payment_reference = %reference,
                "Payment succeeded for a failed checkout attempt, reopening"
            );
            self.alert(ActivityAction::PaymentSucceededAfterFailure, &attempt, &detail);
        }

        self.settle(attempt, &intent).await
    }

    /// The processor could not be asked about a captured payment; count it
    /// as a replay so backoff and dead-lettering still apply
    async fn replay_failed(&self, attempt: &CheckoutAttempt, err: &CheckoutError) {
        if attempt.state != AttemptState::Charged {
            return;
        }
        tracing::warn!(
            attempt_id = %attempt.attempt_id,
            retry_count = attempt.retry_count + 1,
            error = %err,
            "Payment lookup failed during reconciliation"
        );
        self.patch_quietly(
            attempt,
            AttemptPatch::state(AttemptState::Charged)
                .retry_count(attempt.retry_count + 1)
                .last_error(err.to_string()),
        )
        .await;
    }

    /// Payment has succeeded: check the charged amount, mark the ledger
    /// `charged`, then record the order.
    async fn settle(
        &self,
        mut attempt: CheckoutAttempt,
        intent: &PaymentIntent,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        enter_stage(&attempt.attempt_id, CheckoutStage::PaymentSucceeded);
        let recovering = attempt.state.is_unreconciled();

        if intent.amount != attempt.snapshot.amount_minor {
            let err = CheckoutError::PaymentAmountMismatch {
                payment_reference: intent.id.clone(),
                expected_minor: attempt.snapshot.amount_minor,
                charged_minor: intent.amount,
            };
            tracing::error!(attempt_id = %attempt.attempt_id, error = %err, "Charged amount mismatch");
            self.patch_quietly(
                &attempt,
                AttemptPatch::state(AttemptState::DeadLetter)
                    .payment_reference(&intent.id)
                    .last_error(err.to_string()),
            )
            .await;
            self.alert(ActivityAction::PaymentAmountMismatch, &attempt, &err.to_string());
            return Err(err);
        }

        if matches!(attempt.state, AttemptState::Initiated | AttemptState::Failed) {
            self.patch_quietly(
                &attempt,
                AttemptPatch::state(AttemptState::Charged).payment_reference(&intent.id),
            )
            .await;
            attempt.state = AttemptState::Charged;
            attempt.payment_reference = Some(intent.id.clone());
        }

        self.record(&attempt, &intent.id, recovering).await
    }

    async fn record(
        &self,
        attempt: &CheckoutAttempt,
        payment_reference: &str,
        recovering: bool,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let attempt_id = attempt.attempt_id.as_str();

        match persist::persist_order(self.orders.as_ref(), payment_reference, &attempt.snapshot)
            .await
        {
            Ok(order) => {
                enter_stage(attempt_id, CheckoutStage::OrderRecorded);
                self.patch_quietly(
                    attempt,
                    AttemptPatch::state(AttemptState::Recorded)
                        .payment_reference(payment_reference)
                        .order_id(order.id),
                )
                .await;
                if recovering {
                    tracing::info!(
                        attempt_id,
                        order_id = order.id,
                        retry_count = attempt.retry_count,
                        "Unreconciled payment recovered"
                    );
                    self.activity.log(
                        ActivityAction::ReconciliationRecovered,
                        "checkout_attempt",
                        attempt_id,
                        None,
                        serde_json::json!({
                            "payment_reference": payment_reference,
                            "order_id": order.id,
                            "retry_count": attempt.retry_count,
                        }),
                    );
                }
                Ok(CheckoutOutcome {
                    success: true,
                    order_id: order.id,
                    attempt_id: attempt_id.to_string(),
                    payment_reference: payment_reference.to_string(),
                })
            }
            Err(err) => {
                enter_stage(attempt_id, CheckoutStage::PersistFailed);
                tracing::error!(
                    attempt_id,
                    payment_reference,
                    retry_count = attempt.retry_count,
                    error = %err,
                    "Payment captured but order recording failed"
                );

                // Stay unreconciled so the sweeper (or an operator) replays it
                let state = match attempt.state {
                    AttemptState::DeadLetter => AttemptState::DeadLetter,
                    _ => AttemptState::Charged,
                };
                self.patch_quietly(
                    attempt,
                    AttemptPatch::state(state)
                        .payment_reference(payment_reference)
                        .retry_count(attempt.retry_count + 1)
                        .last_error(err.to_string()),
                )
                .await;

                if attempt.retry_count == 0 && state == AttemptState::Charged {
                    let action = match err {
                        CheckoutError::PartialPersistence { .. } => {
                            ActivityAction::PaymentPartiallyRecorded
                        }
                        _ => ActivityAction::PaymentRecordingFailed,
                    };
                    self.alert(action, attempt, &err.to_string());
                }
                Err(err)
            }
        }
    }

    // ========================================================================
    // Ledger and alerting helpers
    // ========================================================================

    /// Ledger write whose failure must not stop a flow that already moved money
    async fn patch_quietly(&self, attempt: &CheckoutAttempt, patch: AttemptPatch) {
        if let Some(next) = patch.state
            && !attempt.state.can_transition_to(next)
        {
            tracing::error!(
                attempt_id = %attempt.attempt_id,
                from = %attempt.state,
                to = %next,
                "Refusing invalid ledger transition"
            );
            return;
        }

        if let Err(e) = self.ledger.update(&attempt.attempt_id, &patch).await {
            tracing::error!(
                attempt_id = %attempt.attempt_id,
                patch = ?patch,
                error = %e,
                "Failed to update checkout ledger"
            );
        }
    }

    fn alert(&self, action: ActivityAction, attempt: &CheckoutAttempt, error: &str) {
        self.activity.log(
            action,
            "checkout_attempt",
            attempt.attempt_id.clone(),
            None,
            serde_json::json!({
                "payment_reference": attempt.payment_reference,
                "customer_email": attempt.snapshot.customer.email,
                "total_amount": attempt.snapshot.total_amount.to_string(),
                "retry_count": attempt.retry_count,
                "error": error,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_attempt_ids_are_unique() {
        let a = attempt_id_for(None).unwrap();
        let b = attempt_id_for(None).unwrap();
        assert!(a.starts_with("att_"));
        assert_ne!(a, b);
    }

    #[test]
    fn idempotency_keys_are_validated() {
        assert_eq!(
            attempt_id_for(Some(" order-2024_abc ")).unwrap(),
            "order-2024_abc"
        );
        assert!(matches!(
            attempt_id_for(Some("short")),
            Err(CheckoutError::InvalidIdempotencyKey(_))
        ));
        assert!(matches!(
            attempt_id_for(Some("has spaces inside")),
            Err(CheckoutError::InvalidIdempotencyKey(_))
        ));
        assert!(attempt_id_for(Some(&"k".repeat(65))).is_err());
    }

    #[tokio::test]
    async fn attempt_locks_serialize_same_key() {
        let locks = AttemptLocks::default();
        let guard = locks.acquire("att_1").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.acquire("att_1").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different key is not blocked
        let _g2 = locks.acquire("att_2").await;

        drop(guard);
        waiter.await.unwrap();
    }
}
