//! Checkout: amount verification, payment, order recording and reconciliation
//!
//! Per attempt the flow is
//!
//! ```text
//! INIT --validate amount--> AMOUNT_OK --create intent--> INTENT_CREATED
//!   --confirm payment--> {PAYMENT_SUCCEEDED | PAYMENT_FAILED}
//! PAYMENT_SUCCEEDED --persist order+items--> {ORDER_RECORDED | PERSIST_FAILED}
//! ```
//!
//! No order row exists before the processor reports `succeeded`; until then
//! the attempt lives only in the reconciliation ledger. `PERSIST_FAILED`
//! leaves the ledger entry `charged` for the sweeper to replay.

pub mod confirm;
pub mod intent;
pub mod orchestrator;
pub mod persist;
pub mod sweeper;

pub use confirm::ConfirmPolicy;
pub use orchestrator::{CheckoutService, CheckoutSettings};
pub use sweeper::{ReconciliationSweeper, SweepReport};

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};

use crate::money::AmountError;
use crate::store::{AttemptState, StoreError};
use crate::stripe::{GatewayError, PaymentIntentStatus};

/// Checkout state machine stages, logged as an attempt progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Init,
    AmountOk,
    IntentCreated,
    PaymentSucceeded,
    PaymentFailed,
    OrderRecorded,
    PersistFailed,
}

pub(crate) fn enter_stage(attempt_id: &str, stage: CheckoutStage) {
    match stage {
        CheckoutStage::PersistFailed => {
            tracing::error!(attempt_id, ?stage, "Checkout stage")
        }
        CheckoutStage::PaymentFailed => tracing::warn!(attempt_id, ?stage, "Checkout stage"),
        _ => tracing::info!(attempt_id, ?stage, "Checkout stage"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    // ========== Before any money moves ==========
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid line item {item}: {reason}")]
    InvalidLineItem { item: String, reason: String },

    #[error("Declared total {declared} does not match expected total {expected}")]
    AmountMismatch { expected: Decimal, declared: Decimal },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid customer details: {0}")]
    InvalidCustomer(String),

    #[error("Delivery address is required for delivery orders")]
    DeliveryAddressRequired,

    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("Catalog lookup failed: {0}")]
    Catalog(#[source] StoreError),

    #[error("Checkout ledger unavailable: {0}")]
    Ledger(#[source] StoreError),

    // ========== Payment processor ==========
    #[error("Payment gateway error: {0}")]
    PaymentGateway(#[from] GatewayError),

    #[error("Payment declined: {message}")]
    PaymentDeclined {
        status: Option<PaymentIntentStatus>,
        message: String,
    },

    #[error("Payment not completed (status {status})")]
    PaymentNotCompleted { status: PaymentIntentStatus },

    // ========== After the charge ==========
    #[error("Payment {payment_reference} charged {charged_minor}, checkout total was {expected_minor}")]
    PaymentAmountMismatch {
        payment_reference: String,
        expected_minor: i64,
        charged_minor: i64,
    },

    #[error("Payment {payment_reference} succeeded but the order could not be recorded: {reason}")]
    Persistence {
        payment_reference: String,
        reason: String,
    },

    #[error(
        "Payment {payment_reference} succeeded but order {order_id} was only partially recorded: {reason}"
    )]
    PartialPersistence {
        payment_reference: String,
        order_id: i64,
        reason: String,
    },

    // ========== Ledger lookups ==========
    #[error("Checkout attempt {0} not found")]
    AttemptNotFound(String),

    #[error("Checkout attempt {attempt_id} is {state}: {reason}")]
    AttemptInvalidState {
        attempt_id: String,
        state: AttemptState,
        reason: String,
    },
}

impl CheckoutError {
    /// Money has moved and the order is missing or incomplete
    pub fn is_post_charge(&self) -> bool {
        matches!(
            self,
            Self::Persistence { .. }
                | Self::PartialPersistence { .. }
                | Self::PaymentAmountMismatch { .. }
        )
    }

    pub(crate) fn invalid_state(
        attempt_id: &str,
        state: AttemptState,
        reason: impl Into<String>,
    ) -> Self {
        Self::AttemptInvalidState {
            attempt_id: attempt_id.to_string(),
            state,
            reason: reason.into(),
        }
    }
}

impl From<AmountError> for CheckoutError {
    fn from(e: AmountError) -> Self {
        match e {
            AmountError::EmptyCart => Self::EmptyCart,
            AmountError::InvalidLineItem { item, reason } => Self::InvalidLineItem { item, reason },
            AmountError::AmountMismatch { expected, declared } => {
                Self::AmountMismatch { expected, declared }
            }
            e @ (AmountError::NonPositiveAmount(_) | AmountError::OutOfRange(_)) => {
                Self::InvalidAmount(e.to_string())
            }
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::EmptyCart => AppError::new(ErrorCode::CartEmpty),
            CheckoutError::InvalidLineItem { item, reason } => {
                AppError::with_message(ErrorCode::InvalidLineItem, format!("{item}: {reason}"))
                    .with_detail("item", item)
            }
            CheckoutError::AmountMismatch { expected, declared } => {
                AppError::new(ErrorCode::AmountMismatch)
                    .with_detail("expected", expected.to_string())
                    .with_detail("declared", declared.to_string())
            }
            CheckoutError::InvalidAmount(msg) => {
                AppError::with_message(ErrorCode::ValueOutOfRange, msg)
            }
            CheckoutError::InvalidCustomer(msg) => AppError::validation(msg),
            CheckoutError::DeliveryAddressRequired => {
                AppError::new(ErrorCode::DeliveryAddressRequired)
            }
            CheckoutError::InvalidIdempotencyKey(msg) => AppError::invalid_request(msg),
            CheckoutError::Catalog(source) | CheckoutError::Ledger(source) => {
                tracing::error!(error = %source, "Checkout storage error before charge");
                AppError::new(ErrorCode::DatabaseError)
            }
            CheckoutError::PaymentGateway(GatewayError::CardDeclined {
                message,
                decline_code,
                ..
            }) => {
                let err = AppError::with_message(ErrorCode::PaymentDeclined, message);
                match decline_code {
                    Some(code) => err.with_detail("decline_code", code),
                    None => err,
                }
            }
            CheckoutError::PaymentGateway(GatewayError::Http(source)) => {
                tracing::warn!(error = %source, "Payment processor unreachable");
                AppError::new(ErrorCode::PaymentGatewayError)
            }
            CheckoutError::PaymentGateway(source) => {
                AppError::with_message(ErrorCode::PaymentGatewayError, source.to_string())
            }
            CheckoutError::PaymentDeclined { status, message } => {
                let err = AppError::with_message(ErrorCode::PaymentDeclined, message);
                match status {
                    Some(status) => err.with_detail("status", status.as_str()),
                    None => err,
                }
            }
            CheckoutError::PaymentNotCompleted { status } => {
                AppError::new(ErrorCode::PaymentNotCompleted).with_detail("status", status.as_str())
            }
            CheckoutError::PaymentAmountMismatch {
                payment_reference, ..
            } => AppError::with_message(
                ErrorCode::PaymentAmountMismatch,
                "Your payment could not be matched to your order, please contact support",
            )
            .with_detail("payment_reference", payment_reference),
            CheckoutError::Persistence {
                payment_reference, ..
            } => AppError::new(ErrorCode::PaymentRecordingFailed)
                .with_detail("payment_reference", payment_reference),
            CheckoutError::PartialPersistence {
                payment_reference,
                order_id,
                ..
            } => AppError::new(ErrorCode::PaymentPartiallyRecorded)
                .with_detail("payment_reference", payment_reference)
                .with_detail("order_id", order_id),
            CheckoutError::AttemptNotFound(attempt_id) => {
                AppError::new(ErrorCode::CheckoutAttemptNotFound)
                    .with_detail("attempt_id", attempt_id)
            }
            CheckoutError::AttemptInvalidState {
                attempt_id,
                state,
                reason,
            } => AppError::with_message(ErrorCode::CheckoutAttemptInvalidState, reason)
                .with_detail("attempt_id", attempt_id)
                .with_detail("state", state.as_str()),
        }
    }
}
