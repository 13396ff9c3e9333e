//! Admin authentication and per-IP rate limiting

pub mod admin_auth;
pub mod rate_limit;

pub use admin_auth::{AdminIdentity, admin_auth_middleware, create_token};
pub use rate_limit::RateLimiter;
