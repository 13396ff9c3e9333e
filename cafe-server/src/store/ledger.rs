//! `checkout_attempts` reconciliation ledger
//!
//! One row per checkout attempt, written before any money moves:
//!
//! ```text
//! initiated --charge ok--> charged --order written--> recorded
//!     |                    ^  |
//!     +--declined--> failed   +--replays exhausted--> dead_letter --manual replay--> recorded
//!                  (late success)
//! ```
//!
//! A `charged` row is a captured payment with no complete order yet. The
//! sweeper retries those until they are `recorded` or dead-lettered.
//! `failed` is not final: after a decline the intent stays payable, so a
//! later success moves the row back to `charged`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::checkout::CheckoutSnapshot;

use super::{RestClient, StoreResult, eq, in_list, single_row};

const CHECKOUT_ATTEMPTS: &str = "checkout_attempts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Amount verified, intent requested or created, no money captured yet
    Initiated,
    /// Processor reported success, order not yet fully written
    Charged,
    /// Order and items written and confirmed
    Recorded,
    /// Payment did not succeed (yet); reopened if the processor later reports success
    Failed,
    /// Automatic replays exhausted; needs an operator
    DeadLetter,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Charged => "charged",
            Self::Recorded => "recorded",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Money may have moved without a complete order
    pub fn is_unreconciled(&self) -> bool {
        matches!(self, Self::Charged | Self::DeadLetter)
    }

    /// Forward-only transitions; `Charged -> Charged` records a retry.
    /// `Failed -> Charged` is a late success after a decline.
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Initiated, Initiated)
                | (Initiated, Charged)
                | (Initiated, Failed)
                | (Initiated, DeadLetter)
                | (Failed, Charged)
                | (Failed, DeadLetter)
                | (Charged, Charged)
                | (Charged, Recorded)
                | (Charged, DeadLetter)
                | (DeadLetter, DeadLetter)
                | (DeadLetter, Recorded)
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttempt {
    pub attempt_id: String,
    pub state: AttemptState,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    pub snapshot: CheckoutSnapshot,
    #[serde(default)]
    pub retry_count: i32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttempt {
    pub attempt_id: String,
    pub state: AttemptState,
    pub snapshot: CheckoutSnapshot,
}

impl NewAttempt {
    pub fn new(attempt_id: impl Into<String>, snapshot: CheckoutSnapshot) -> Self {
        Self {
            attempt_id: attempt_id.into(),
            state: AttemptState::Initiated,
            snapshot,
        }
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttemptPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AttemptState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl AttemptPatch {
    pub fn state(state: AttemptState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    pub fn order_id(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn retry_count(mut self, count: i32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

#[async_trait]
pub trait ReconciliationLedger: Send + Sync {
    /// Insert a new attempt. Fails with `Conflict` if the id is taken.
    async fn open(&self, attempt: &NewAttempt) -> StoreResult<CheckoutAttempt>;

    async fn get(&self, attempt_id: &str) -> StoreResult<Option<CheckoutAttempt>>;

    async fn update(&self, attempt_id: &str, patch: &AttemptPatch)
    -> StoreResult<CheckoutAttempt>;

    /// Oldest first
    async fn list_by_state(&self, states: &[AttemptState]) -> StoreResult<Vec<CheckoutAttempt>>;
}

#[derive(Debug, Clone)]
pub struct RestLedger {
    rest: RestClient,
}

impl RestLedger {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[derive(Serialize)]
struct Stamped<'a> {
    #[serde(flatten)]
    patch: &'a AttemptPatch,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl ReconciliationLedger for RestLedger {
    async fn open(&self, attempt: &NewAttempt) -> StoreResult<CheckoutAttempt> {
        let rows = self.rest.insert(CHECKOUT_ATTEMPTS, attempt).await?;
        single_row(rows, CHECKOUT_ATTEMPTS)
    }

    async fn get(&self, attempt_id: &str) -> StoreResult<Option<CheckoutAttempt>> {
        let rows: Vec<CheckoutAttempt> = self
            .rest
            .select(
                CHECKOUT_ATTEMPTS,
                &[
                    ("select", "*".to_string()),
                    ("attempt_id", eq(attempt_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        attempt_id: &str,
        patch: &AttemptPatch,
    ) -> StoreResult<CheckoutAttempt> {
        let body = Stamped {
            patch,
            updated_at: Utc::now(),
        };
        let rows = self
            .rest
            .update(CHECKOUT_ATTEMPTS, &[("attempt_id", eq(attempt_id))], &body)
            .await?;
        single_row(rows, CHECKOUT_ATTEMPTS)
    }

    async fn list_by_state(&self, states: &[AttemptState]) -> StoreResult<Vec<CheckoutAttempt>> {
        let names: Vec<&str> = states.iter().map(AttemptState::as_str).collect();
        self.rest
            .select(
                CHECKOUT_ATTEMPTS,
                &[
                    ("select", "*".to_string()),
                    ("state", in_list(&names)),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await
    }
}
