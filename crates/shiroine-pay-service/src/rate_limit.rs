//! Per-client rate limiting.
//!
//! Each client address gets its own GCRA cell in a keyed `governor` limiter.
//! Idle clients are dropped by [`RateLimiter::prune`], which the binary runs
//! on an interval so the key set stays bounded.

use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::middleware::NoOpMiddleware;
use governor::Quota;

use crate::error::ApiError;
use crate::state::AppState;

/// Request limits keyed by client address.
pub struct RateLimiter<C: Clock = DefaultClock> {
    inner: governor::RateLimiter<String, DashMapStateStore<String>, C, NoOpMiddleware<C::Instant>>,
}

impl RateLimiter {
    /// Allow `burst` requests at once, regaining one every `refill_every`.
    #[must_use]
    pub fn new(burst: u32, refill_every: Duration) -> Self {
        Self::with_clock(burst, refill_every, &DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Like [`RateLimiter::new`] but reading time from `clock`.
    #[must_use]
    pub fn with_clock(burst: u32, refill_every: Duration, clock: &C) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        // A zero refill period has no GCRA form; refill the whole burst each second.
        let quota = Quota::with_period(refill_every)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            inner: governor::RateLimiter::dashmap_with_clock(quota, clock),
        }
    }

    /// Take one request for `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.inner.check_key(&key.to_string()).is_ok()
    }

    /// Forget clients whose allowance has fully recovered.
    pub fn prune(&self) {
        self.inner.retain_recent();
        self.inner.shrink_to_fit();
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no client is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clients", &self.len())
            .finish()
    }
}

/// Prune `limiter` every `every` until the runtime shuts down.
pub fn spawn_pruning(limiter: Arc<RateLimiter>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let before = limiter.len();
            limiter.prune();
            tracing::debug!(before, after = limiter.len(), "Pruned rate limiter");
        }
    })
}

/// The client key: first `X-Forwarded-For` entry, else the peer address.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting clients that exhausted their allowance.
pub async fn limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if !state.rate_limiter.allow(&key) {
        tracing::warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use governor::clock::FakeRelativeClock;

    #[test]
    fn burst_then_refill() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(3, Duration::from_secs(9), &clock);

        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        clock.advance(Duration::from_secs(8));
        assert!(!limiter.allow("a"));
        clock.advance(Duration::from_secs(2));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn clients_are_independent() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(1, Duration::from_secs(9), &clock);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn prune_drops_recovered_clients_only() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(1, Duration::from_secs(9), &clock);

        assert!(limiter.allow("idle"));
        clock.advance(Duration::from_secs(60));
        assert!(limiter.allow("busy"));
        assert_eq!(limiter.len(), 2);

        limiter.prune();
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.allow("busy"));
        assert!(limiter.allow("idle"));
    }

    #[test]
    fn concurrent_first_requests_share_one_allowance() {
        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(3600)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..10).filter(|_| limiter.allow("same")).count())
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(allowed, 50);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "10.0.0.1");
        assert_eq!(client_key(&headers, None), "unknown");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.7");
    }
}
