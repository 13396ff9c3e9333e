//! Error codes and the JSON error body shared by the café services
//!
//! Handlers return [`AppError`]; it renders as an [`ApiResponse`] whose
//! `code` is an [`ErrorCode`] number and whose HTTP status comes from
//! [`ErrorCode::http_status`].
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! let err = AppError::new(ErrorCode::PaymentRecordingFailed)
//!     .with_detail("payment_reference", "pi_123");
//!
//! let response = ApiResponse::<()>::error(&err);
//! assert_eq!(response.code, Some(5006));
//! ```

mod codes;
mod http;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
