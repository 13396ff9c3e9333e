//! cafe-server binary
//!
//! `cafe-server` serves the API; `cafe-server hash-password <password>` prints
//! an Argon2 hash for `ADMIN_PASSWORD_HASH`.

use std::sync::Arc;
use std::time::Duration;

use cafe_server::checkout::ReconciliationSweeper;
use cafe_server::{AppState, Config, api, util};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cafe_server=info,tower_http=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return match (command.as_str(), args.next()) {
            ("hash-password", Some(password)) => {
                println!("{}", util::hash_password(&password).map_err(|e| e.to_string())?);
                Ok(())
            }
            _ => Err("usage: cafe-server [hash-password <password>]".into()),
        };
    }

    let config = Config::from_env()?;
    tracing::info!("Starting cafe-server (env: {})", config.environment);

    let state = AppState::new(&config)?;

    // Reconciliation sweeper
    let sweeper = ReconciliationSweeper::new(
        Arc::clone(&state.checkout),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );
    tokio::spawn(sweeper.run());

    // Periodic rate limiter cleanup (every 5 minutes)
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rate_limiter.cleanup().await;
        }
    });

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("cafe-server HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
