//! Reconciliation sweeper
//!
//! Periodically replays `charged` ledger entries (payment captured, order not
//! recorded) with exponential backoff, and settles `initiated` entries whose
//! outcome was never reported back. Entries that exhaust their replays move to
//! `dead_letter` and raise an activity alert. Abandoned entries have their
//! intent canceled before they are closed, so nothing can charge them later.
//!
//! `failed` entries are not listed: a success after a decline arrives through
//! the webhook, which is redelivered until the attempt is recorded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{CheckoutError, CheckoutService};
use crate::store::{AttemptState, CheckoutAttempt};

pub const MAX_REPLAY_ATTEMPTS: i32 = 5;
const REPLAY_BASE_DELAY_SECS: i64 = 30;
const REPLAY_MAX_DELAY_SECS: i64 = 1800; // 30 minutes max
/// An `initiated` attempt this old with no webhook is checked with the processor
const STALE_INITIATED_SECS: i64 = 900;
/// An `initiated` attempt this old that never succeeded is closed as failed
const ABANDONED_INITIATED_SECS: i64 = 86_400;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub recovered: usize,
    pub still_failing: usize,
    pub dead_lettered: usize,
    pub abandoned: usize,
}

/// Delay before replay number `retry_count + 1`: base * 2^retry_count, capped
pub fn replay_delay(retry_count: i32) -> chrono::Duration {
    let exp = retry_count.clamp(0, 16) as u32;
    let secs = REPLAY_BASE_DELAY_SECS
        .saturating_mul(2i64.pow(exp))
        .min(REPLAY_MAX_DELAY_SECS);
    chrono::Duration::seconds(secs)
}

/// Whether a `charged` entry's backoff has elapsed
pub fn replay_due(attempt: &CheckoutAttempt, now: DateTime<Utc>) -> bool {
    now >= attempt.updated_at + replay_delay(attempt.retry_count)
}

pub struct ReconciliationSweeper {
    service: Arc<CheckoutService>,
    interval: Duration,
}

impl ReconciliationSweeper {
    pub fn new(service: Arc<CheckoutService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run until the task is dropped
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reconciliation sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.sweep_at(Utc::now()).await;
            if report != SweepReport::default() {
                tracing::info!(?report, "Reconciliation sweep finished");
            }
        }
    }

    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let pending = match self
            .service
            .ledger()
            .list_by_state(&[AttemptState::Charged, AttemptState::Initiated])
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list unreconciled checkout attempts");
                return report;
            }
        };

        for attempt in pending {
            report.scanned += 1;
            match attempt.state {
                AttemptState::Charged => self.replay_charged(&attempt, now, &mut report).await,
                AttemptState::Initiated => self.settle_stale(&attempt, now, &mut report).await,
                _ => {}
            }
        }
        report
    }

    async fn replay_charged(
        &self,
        attempt: &CheckoutAttempt,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        if attempt.retry_count >= MAX_REPLAY_ATTEMPTS {
            // The listing may be stale; dead_letter re-reads the row under its lock
            match self.service.dead_letter(&attempt.attempt_id).await {
                Ok(true) => report.dead_lettered += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.attempt_id, error = %e, "Failed to dead-letter attempt")
                }
            }
            return;
        }
        if !replay_due(attempt, now) {
            return;
        }

        match self.service.reconcile(&attempt.attempt_id).await {
            Ok(_) => report.recovered += 1,
            Err(e) => {
                // The orchestrator already bumped retry_count and logged
                tracing::warn!(
                    attempt_id = %attempt.attempt_id,
                    retry_count = attempt.retry_count + 1,
                    error = %e,
                    "Reconciliation replay failed"
                );
                report.still_failing += 1;
            }
        }
    }

    async fn settle_stale(
        &self,
        attempt: &CheckoutAttempt,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let age = now - attempt.created_at;
        if age < chrono::Duration::seconds(STALE_INITIATED_SECS) {
            return;
        }
        let abandoned = age >= chrono::Duration::seconds(ABANDONED_INITIATED_SECS);

        if attempt.payment_reference.is_some() {
            match self.service.reconcile(&attempt.attempt_id).await {
                Ok(_) => {
                    tracing::warn!(
                        attempt_id = %attempt.attempt_id,
                        "Recorded a succeeded payment that was never reported back"
                    );
                    report.recovered += 1;
                    return;
                }
                Err(CheckoutError::PaymentNotCompleted { .. })
                | Err(CheckoutError::PaymentDeclined { .. })
                    if abandoned => {}
                Err(e) => {
                    if e.is_post_charge() {
                        report.still_failing += 1;
                    }
                    tracing::debug!(attempt_id = %attempt.attempt_id, error = %e, "Stale attempt not settled");
                    return;
                }
            }
        } else if !abandoned {
            return;
        }

        match self.service.abandon(&attempt.attempt_id).await {
            Ok(true) => report.abandoned += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(attempt_id = %attempt.attempt_id, error = %e, "Failed to close abandoned attempt")
            }
        }
    }
}
