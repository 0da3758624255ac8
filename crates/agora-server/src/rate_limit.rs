//! Per-client request throttling.
//!
//! Buckets are keyed by the presented bearer credential when the request
//! carries one (so one person's devices share a budget wherever they
//! connect from), falling back to the client IP for anonymous traffic.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClientKey {
    /// Hash of the presented bearer token.
    Credential(u64),
    Ip(IpAddr),
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<ClientKey, TokenBucket>>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    async fn check(&self, key: ClientKey) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_consume(self.rate, self.capacity)
    }

    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10.0, 30.0)
    }
}

pub async fn rate_limit_middleware(
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(key) = extract_client_key(&req) {
        if !limiter.check(key.clone()).await {
            warn!(?key, "rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

/// Prefer the bearer credential, then ConnectInfo, then proxy headers.
fn extract_client_key<B>(req: &Request<B>) -> Option<ClientKey> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(value) = auth.to_str() {
            let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
            if !token.is_empty() {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                token.hash(&mut hasher);
                return Some(ClientKey::Credential(hasher.finish()));
            }
        }
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(ClientKey::Ip(connect_info.0.ip()));
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                if let Ok(ip) = first.trim().parse::<IpAddr>() {
                    return Some(ClientKey::Ip(ip));
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_then_throttles() {
        let limiter = RateLimiter::new(10.0, 5.0);
        let key = ClientKey::Credential(42);

        for _ in 0..5 {
            assert!(limiter.check(key.clone()).await);
        }
        assert!(!limiter.check(key).await);
    }

    #[tokio::test]
    async fn buckets_are_independent_per_client() {
        let limiter = RateLimiter::new(10.0, 2.0);
        let a = ClientKey::Credential(1);
        let b = ClientKey::Ip("10.0.0.2".parse().unwrap());

        assert!(limiter.check(a.clone()).await);
        assert!(limiter.check(a.clone()).await);
        assert!(!limiter.check(a).await);

        assert!(limiter.check(b).await);
    }

    #[tokio::test]
    async fn purge_drops_idle_buckets() {
        let limiter = RateLimiter::new(10.0, 5.0);
        assert!(limiter.check(ClientKey::Credential(7)).await);

        limiter.purge_stale(0.0).await;

        let buckets = limiter.buckets.lock().await;
        assert!(buckets.is_empty());
    }
}
