//! HTTP status for each error code

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::CheckoutAttemptNotFound => StatusCode::NOT_FOUND,
            Self::CheckoutAttemptInvalidState => StatusCode::CONFLICT,

            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::AdminRequired => StatusCode::FORBIDDEN,

            // The client's view of the cart or charge disagrees with ours
            Self::AmountMismatch | Self::PaymentAmountMismatch => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PaymentDeclined | Self::PaymentNotCompleted => StatusCode::PAYMENT_REQUIRED,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::PaymentGatewayError => StatusCode::BAD_GATEWAY,

            Self::InternalError
            | Self::DatabaseError
            | Self::PaymentRecordingFailed
            | Self::PaymentPartiallyRecorded => StatusCode::INTERNAL_SERVER_ERROR,

            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::ValueOutOfRange
            | Self::CartEmpty
            | Self::InvalidLineItem
            | Self::DeliveryAddressRequired
            | Self::InvalidWebhookSignature => StatusCode::BAD_REQUEST,
        }
    }
}
