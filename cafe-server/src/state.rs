//! Application state for cafe-server

use std::sync::Arc;

use crate::activity::{ActivityLog, ActivityWorker};
use crate::auth::RateLimiter;
use crate::checkout::{CheckoutService, CheckoutSettings, ConfirmPolicy};
use crate::config::Config;
use crate::store::{RestCatalog, RestClient, RestLedger, RestOrderStore};
use crate::stripe::StripeGateway;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const ACTIVITY_BUFFER: usize = 256;

/// Admin account the login endpoint checks against
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout orchestrator (gateway, stores, ledger, activity log)
    pub checkout: Arc<CheckoutService>,
    /// Rate limiter for checkout and login routes
    pub rate_limiter: RateLimiter,
    /// JWT secret for admin sessions
    pub jwt_secret: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    pub admin: AdminCredentials,
}

impl AppState {
    /// Build clients from configuration and start the activity log worker
    pub fn new(config: &Config) -> Result<Self, BoxError> {
        let rest = RestClient::new(&config.store_url, &config.store_service_key)?;
        let gateway = StripeGateway::new(&config.stripe_api_base, &config.stripe_secret_key)?;

        let (activity, activity_rx) = ActivityLog::new(ACTIVITY_BUFFER);
        tokio::spawn(ActivityWorker::new(rest.clone()).run(activity_rx));

        let settings = CheckoutSettings {
            currency: config.currency.clone(),
            delivery_fee: config.delivery_fee,
            confirm: ConfirmPolicy {
                poll_attempts: config.confirm_poll_attempts,
                poll_interval: config.confirm_poll_interval(),
            },
        };

        let checkout = CheckoutService::new(
            Arc::new(gateway),
            Arc::new(RestOrderStore::new(rest.clone())),
            Arc::new(RestCatalog::new(rest.clone())),
            Arc::new(RestLedger::new(rest)),
            activity,
            settings,
        );

        Ok(Self::from_parts(
            Arc::new(checkout),
            config.jwt_secret.clone(),
            config.stripe_webhook_secret.clone(),
            AdminCredentials {
                email: config.admin_email.clone(),
                password_hash: config.admin_password_hash.clone(),
            },
        )
        .with_trusted_proxy_hops(config.trusted_proxy_hops))
    }

    /// Assemble state around an existing checkout service
    pub fn from_parts(
        checkout: Arc<CheckoutService>,
        jwt_secret: String,
        stripe_webhook_secret: String,
        admin: AdminCredentials,
    ) -> Self {
        Self {
            checkout,
            rate_limiter: RateLimiter::new(0),
            jwt_secret,
            stripe_webhook_secret,
            admin,
        }
    }

    /// Rate-limit by the X-Forwarded-For entry this many proxies from the right
    pub fn with_trusted_proxy_hops(mut self, hops: usize) -> Self {
        self.rate_limiter = RateLimiter::new(hops);
        self
    }
}
