//! Café server configuration

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Surcharge added to delivery orders when `DELIVERY_FEE` is unset
const DEFAULT_DELIVERY_FEE: &str = "2.50";

/// Café server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    /// Data store base URL (the REST API lives under `/rest/v1`)
    pub store_url: String,
    /// Data store service-role key (sent as `apikey` and bearer token)
    pub store_service_key: String,
    /// Payment processor API base URL
    pub stripe_api_base: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// ISO currency code, lowercase
    pub currency: String,
    /// Fixed surcharge for delivery orders (major units)
    pub delivery_fee: Decimal,
    /// JWT secret for admin sessions
    pub jwt_secret: String,
    /// Admin login email
    pub admin_email: String,
    /// Argon2 PHC hash of the admin password
    pub admin_password_hash: String,
    /// Seconds between reconciliation sweeps
    pub sweep_interval_secs: u64,
    /// Retrieve calls made while a confirmed intent is still processing
    pub confirm_poll_attempts: u32,
    /// Delay between those retrieve calls
    pub confirm_poll_interval_ms: u64,
    /// Reverse proxies that append to X-Forwarded-For; 0 ignores the header
    pub trusted_proxy_hops: usize,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let delivery_fee = parse_delivery_fee(
            &std::env::var("DELIVERY_FEE").unwrap_or_else(|_| DEFAULT_DELIVERY_FEE.into()),
        )?;

        Ok(Self {
            http_port: Self::parse_or("HTTP_PORT", 8080),
            store_url: std::env::var("STORE_URL").map_err(|_| "STORE_URL must be set")?,
            store_service_key: Self::require_secret("STORE_SERVICE_KEY", &environment)?,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            currency: std::env::var("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|_| "gbp".into()),
            delivery_fee,
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            admin_email: std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".into()),
            admin_password_hash: Self::require_secret("ADMIN_PASSWORD_HASH", &environment)?,
            sweep_interval_secs: Self::parse_or("SWEEP_INTERVAL_SECS", 60),
            confirm_poll_attempts: Self::parse_or("CONFIRM_POLL_ATTEMPTS", 10),
            confirm_poll_interval_ms: Self::parse_or("CONFIRM_POLL_INTERVAL_MS", 500),
            trusted_proxy_hops: Self::parse_or("TRUSTED_PROXY_HOPS", 0),
            environment,
        })
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }
}

/// Parse a non-negative major-unit amount such as `2.50`
fn parse_delivery_fee(raw: &str) -> Result<Decimal, BoxError> {
    let fee = Decimal::from_str(raw.trim())
        .map_err(|e| format!("DELIVERY_FEE is not a decimal amount ({raw}): {e}"))?;
    if fee.is_sign_negative() {
        return Err(format!("DELIVERY_FEE must not be negative, got {raw}").into());
    }
    Ok(fee)
}
