//! cafe-server: payment-safe checkout for the café storefront
//!
//! - Verifies cart totals against catalog prices before any charge
//! - Creates and confirms Stripe payment intents with per-attempt idempotency
//! - Records orders only after the processor reports success
//! - Keeps a reconciliation ledger so captured payments are never lost, with a
//!   background sweeper, a webhook and an admin replay endpoint to close gaps

pub mod activity;
pub mod api;
pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod money;
pub mod state;
pub mod store;
pub mod stripe;
pub mod util;

pub use config::Config;
pub use state::AppState;
