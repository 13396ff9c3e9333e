//! Admin activity log
//!
//! [`ActivityLog`] is a cheap cloneable handle that queues entries on a bounded
//! mpsc channel; [`ActivityWorker`] drains it into `admin_activity_log`.
//! Logging never fails the caller: a full or closed channel is reported via
//! tracing and the entry is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::store::RestClient;

const ADMIN_ACTIVITY_LOG: &str = "admin_activity_log";

/// Activity types (enum, not free text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    // ═══ Reconciliation alerts ═══
    /// Charge captured, order header could not be written
    PaymentRecordingFailed,
    /// Charge captured, header written but items or confirmation missing
    PaymentPartiallyRecorded,
    /// Processor charged an amount different from the checkout total
    PaymentAmountMismatch,
    /// Automatic replays exhausted
    ReconciliationDeadLettered,
    /// Processor reported success for an attempt already closed as failed
    PaymentSucceededAfterFailure,

    // ═══ Reconciliation progress ═══
    /// A previously failed recording succeeded on replay
    ReconciliationRecovered,
    /// Operator triggered a replay
    ReconciliationReplayed,

    // ═══ Admin ═══
    AdminLogin,
    AdminLoginFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub action: ActivityAction,
    pub resource_type: String,
    pub resource_id: String,
    pub actor: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Handle for queuing activity entries
#[derive(Debug, Clone)]
pub struct ActivityLog {
    tx: mpsc::Sender<ActivityEntry>,
}

impl ActivityLog {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<ActivityEntry>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (Self { tx }, rx)
    }

    pub fn log(
        &self,
        action: ActivityAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        actor: Option<String>,
        details: serde_json::Value,
    ) {
        let entry = ActivityEntry {
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            actor,
            details,
            created_at: Utc::now(),
        };

        if let Err(e) = self.tx.try_send(entry) {
            let entry = match e {
                mpsc::error::TrySendError::Full(entry) => entry,
                mpsc::error::TrySendError::Closed(entry) => entry,
            };
            tracing::error!(
                action = ?entry.action,
                resource_id = %entry.resource_id,
                details = %entry.details,
                "Activity log unavailable, entry dropped"
            );
        }
    }
}

/// Background writer for activity entries
pub struct ActivityWorker {
    rest: RestClient,
}

impl ActivityWorker {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Run until every [`ActivityLog`] handle is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<ActivityEntry>) {
        tracing::info!("Activity log worker started");

        while let Some(entry) = rx.recv().await {
            match self.rest.insert_minimal(ADMIN_ACTIVITY_LOG, &entry).await {
                Ok(()) => {
                    tracing::debug!(
                        action = ?entry.action,
                        resource = %entry.resource_type,
                        "Activity entry recorded"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        action = ?entry.action,
                        resource_id = %entry.resource_id,
                        error = %e,
                        "Failed to write activity entry"
                    );
                }
            }
        }

        tracing::info!("Activity log channel closed, worker stopping");
    }
}
