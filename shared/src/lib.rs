//! Shared types for the café services
//!
//! Common types used across crates: the unified error system, checkout
//! domain types (cart, order, line items) and small utilities.

pub mod checkout;
pub mod error;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use checkout::{
    CartItem, CheckoutOutcome, CheckoutRequest, CheckoutSnapshot, CustomerDetails,
    FrozenLineItem, IntentRequest, IntentTicket, LineItem, NewOrder, NewOrderItem, Order,
    OrderItem, OrderStatus, OrderType,
};
pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
