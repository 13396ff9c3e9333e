//! Application-layer rate limiting for checkout and admin login routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

const CHECKOUT_MAX_REQUESTS: u32 = 10;
const LOGIN_MAX_REQUESTS: u32 = 5;
const WINDOW_SECS: u64 = 60;

struct IpEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// route name -> (IP -> entry)
    inner: Arc<Mutex<HashMap<&'static str, HashMap<String, IpEntry>>>>,
    /// Reverse proxies in front of the server that append to X-Forwarded-For
    trusted_proxy_hops: usize,
}

impl RateLimiter {
    pub fn new(trusted_proxy_hops: usize) -> Self {
        Self {
            trusted_proxy_hops,
            ..Self::default()
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(
        &self,
        route: &'static str,
        ip: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> bool {
        let mut map = self.inner.lock().await;
        let route_map = map.entry(route).or_default();
        let now = Instant::now();

        let entry = route_map.entry(ip.to_owned()).or_insert_with(|| IpEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start).as_secs() >= window_secs {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= max_requests
    }

    /// Remove entries older than 5 minutes
    pub async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let cutoff = std::time::Duration::from_secs(300);
        let now = Instant::now();

        for route_map in map.values_mut() {
            route_map.retain(|_, entry| now.duration_since(entry.window_start) < cutoff);
        }
        map.retain(|_, route_map| !route_map.is_empty());
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.values().map(HashMap::len).sum()
    }
}

/// Client IP as seen by the outermost trusted proxy.
///
/// Each trusted proxy appends the address it received from, so the client is
/// `trusted_proxy_hops` entries from the right of X-Forwarded-For. Anything
/// further left was written by the client. With no trusted proxies the
/// header is ignored and the peer address is used.
fn extract_ip(request: &Request, trusted_proxy_hops: usize) -> String {
    if trusted_proxy_hops > 0
        && let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        let hops: Vec<&str> = val.split(',').map(str::trim).collect();
        let ip = hops[hops.len().saturating_sub(trusted_proxy_hops)];
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn limit(
    limiter: &RateLimiter,
    route: &'static str,
    max_requests: u32,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_ip(&request, limiter.trusted_proxy_hops);
    if !limiter.check(route, &ip, max_requests, WINDOW_SECS).await {
        tracing::warn!(route, ip = %ip, "Rate limit exceeded");
        return Err(AppError::too_many_requests().into_response());
    }
    Ok(next.run(request).await)
}

/// Checkout routes: 10 requests/minute per IP
pub async fn checkout_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(&state.rate_limiter, "checkout", CHECKOUT_MAX_REQUESTS, request, next).await
}

/// Admin login: 5 requests/minute per IP
pub async fn login_rate_limit(
    State(state): State<crate::state::AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(&state.rate_limiter, "login", LOGIN_MAX_REQUESTS, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn limits_per_route_and_ip() {
        let limiter = RateLimiter::new(0);
        for _ in 0..3 {
            assert!(limiter.check("login", "10.0.0.1", 3, 60).await);
        }
        assert!(!limiter.check("login", "10.0.0.1", 3, 60).await);

        // Other IPs and routes have their own budget
        assert!(limiter.check("login", "10.0.0.2", 3, 60).await);
        assert!(limiter.check("checkout", "10.0.0.1", 3, 60).await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_and_cleanup_forgets() {
        let limiter = RateLimiter::new(0);
        assert!(limiter.check("login", "10.0.0.1", 1, 60).await);
        assert!(!limiter.check("login", "10.0.0.1", 1, 60).await);

        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        assert!(limiter.check("login", "10.0.0.1", 1, 60).await);

        tokio::time::advance(std::time::Duration::from_secs(301)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked().await, 0);
    }

    fn forwarded(chain: &str) -> Request {
        http::Request::builder()
            .header("x-forwarded-for", chain)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn forwarded_for_uses_rightmost_trusted_hop() {
        // Client forged the first entry; our proxy appended the real peer
        let request = forwarded(" 1.2.3.4 , 203.0.113.7");
        assert_eq!(extract_ip(&request, 1), "203.0.113.7");

        // CDN then load balancer
        let request = forwarded("1.2.3.4, 203.0.113.7, 10.0.0.1");
        assert_eq!(extract_ip(&request, 2), "203.0.113.7");

        // Shorter chain than configured: leftmost entry was still added by a proxy
        assert_eq!(extract_ip(&forwarded("203.0.113.7"), 3), "203.0.113.7");
    }

    #[test]
    fn forwarded_for_ignored_without_trusted_proxies() {
        let request = forwarded("203.0.113.7");
        assert_eq!(extract_ip(&request, 0), "unknown");

        let bare = http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_ip(&bare, 1), "unknown");
    }
}
