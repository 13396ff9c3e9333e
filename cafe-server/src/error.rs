//! Service-layer error bridging store failures and API errors
//!
//! `ServiceError` lets handlers use `?` on data store calls: store failures are
//! logged once here and surface as `DatabaseError`, business errors pass
//! through unchanged.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::checkout::CheckoutError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum ServiceError {
    /// Data store or infrastructure error
    Store(StoreError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<CheckoutError> for ServiceError {
    fn from(e: CheckoutError) -> Self {
        ServiceError::App(e.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Store(store_err) => {
                tracing::error!(error = %store_err, "Service data store error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
