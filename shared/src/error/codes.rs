//! Numeric error codes returned in every failed API response
//!
//! The leading digit groups the codes: 0xxx request, 1xxx auth, 2xxx admin
//! access, 3xxx cart, 4xxx checkout attempt, 5xxx payment, 9xxx server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code carried in the `code` field of an error body
///
/// The website switches on these numbers, so a value never changes meaning
/// once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // Request
    ValidationFailed = 2,
    InvalidRequest = 5,
    /// Quantity or price outside the accepted range
    ValueOutOfRange = 8,
    TooManyRequests = 9,

    // Auth
    NotAuthenticated = 1001,
    InvalidCredentials = 1002,
    TokenExpired = 1003,
    TokenInvalid = 1004,

    // Admin access
    AdminRequired = 2002,

    // Cart
    CartEmpty = 3001,
    /// Unknown, unavailable or malformed line item
    InvalidLineItem = 3002,
    /// Declared total differs from the server-side recomputation
    AmountMismatch = 3003,
    DeliveryAddressRequired = 3004,

    // Checkout attempt
    CheckoutAttemptNotFound = 4003,
    /// The attempt cannot take this step from its current state
    CheckoutAttemptInvalidState = 4004,

    // Payment
    /// Processor unreachable or rejected the request
    PaymentGatewayError = 5001,
    PaymentDeclined = 5002,
    /// Intent has not reached `succeeded`
    PaymentNotCompleted = 5003,
    /// Processor charged a different amount than the frozen snapshot
    PaymentAmountMismatch = 5004,
    /// Webhook body did not match its `Stripe-Signature` header
    InvalidWebhookSignature = 5005,
    /// Money moved but no order row exists
    PaymentRecordingFailed = 5006,
    /// Money moved, the order exists, some item rows are missing
    PaymentPartiallyRecorded = 5007,

    // Server
    InternalError = 9001,
    DatabaseError = 9002,
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Money has moved but no complete order record exists
    #[inline]
    pub const fn is_unreconciled_payment(&self) -> bool {
        matches!(
            self,
            ErrorCode::PaymentRecordingFailed | ErrorCode::PaymentPartiallyRecorded
        )
    }

    /// Fault on our side rather than in the request
    #[inline]
    pub const fn is_server_fault(&self) -> bool {
        self.code() >= 9000
    }

    /// Default message shown when the caller supplies none
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::ValueOutOfRange => "Value is out of range",
            ErrorCode::TooManyRequests => "Too many requests, please try again shortly",

            ErrorCode::NotAuthenticated => "Sign in required",
            ErrorCode::InvalidCredentials => "Invalid email or password",
            ErrorCode::TokenExpired => "Session has expired",
            ErrorCode::TokenInvalid => "Invalid session token",

            ErrorCode::AdminRequired => "Admin access required",

            ErrorCode::CartEmpty => "Cart is empty",
            ErrorCode::InvalidLineItem => "Cart contains an invalid item",
            ErrorCode::AmountMismatch => "Order total does not match the cart",
            ErrorCode::DeliveryAddressRequired => "Delivery address is required",

            ErrorCode::CheckoutAttemptNotFound => "Checkout attempt not found",
            ErrorCode::CheckoutAttemptInvalidState => {
                "Checkout attempt cannot be processed in its current state"
            }

            ErrorCode::PaymentGatewayError => "Payment provider error, please try again",
            ErrorCode::PaymentDeclined => "Payment was declined",
            ErrorCode::PaymentNotCompleted => "Payment has not been completed",
            ErrorCode::PaymentAmountMismatch => "Charged amount does not match the order",
            ErrorCode::InvalidWebhookSignature => "Invalid webhook signature",
            ErrorCode::PaymentRecordingFailed => {
                "Payment succeeded but your order could not be recorded, please contact support"
            }
            ErrorCode::PaymentPartiallyRecorded => {
                "Payment succeeded but your order was not fully recorded, please contact support"
            }

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Order store error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// A number that names no [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            2 => ErrorCode::ValidationFailed,
            5 => ErrorCode::InvalidRequest,
            8 => ErrorCode::ValueOutOfRange,
            9 => ErrorCode::TooManyRequests,
            1001 => ErrorCode::NotAuthenticated,
            1002 => ErrorCode::InvalidCredentials,
            1003 => ErrorCode::TokenExpired,
            1004 => ErrorCode::TokenInvalid,
            2002 => ErrorCode::AdminRequired,
            3001 => ErrorCode::CartEmpty,
            3002 => ErrorCode::InvalidLineItem,
            3003 => ErrorCode::AmountMismatch,
            3004 => ErrorCode::DeliveryAddressRequired,
            4003 => ErrorCode::CheckoutAttemptNotFound,
            4004 => ErrorCode::CheckoutAttemptInvalidState,
            5001 => ErrorCode::PaymentGatewayError,
            5002 => ErrorCode::PaymentDeclined,
            5003 => ErrorCode::PaymentNotCompleted,
            5004 => ErrorCode::PaymentAmountMismatch,
            5005 => ErrorCode::InvalidWebhookSignature,
            5006 => ErrorCode::PaymentRecordingFailed,
            5007 => ErrorCode::PaymentPartiallyRecorded,
            9001 => ErrorCode::InternalError,
            9002 => ErrorCode::DatabaseError,
            _ => return Err(InvalidErrorCode(value)),
        };
        Ok(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
