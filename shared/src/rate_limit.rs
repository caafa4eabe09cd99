//! Per-client-key rate limiting for the HTTP surface.
//!
//! Grounded on `AharonR-downloader::download::rate_limiter::RateLimiter`'s
//! shape — a `DashMap<String, Arc<...State>>` for lock-free per-key lookup,
//! an inner `Mutex` guarding the timing fields so a lock is never held
//! across an `.await` — but adapted from that limiter's per-domain *delay*
//! gate (sleep until the next request is allowed) to a per-client-key
//! *counter* that rejects once a sliding window fills, since this pipeline
//! needs a `429`, not a stall.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window request counter, one per client key.
#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

/// Tracks request counts per client key over a fixed window, rejecting once
/// a key exceeds `max_requests` within `window`.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    keys: DashMap<String, Arc<Mutex<WindowState>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            keys: DashMap::new(),
        }
    }

    /// Returns `true` if a request from `client_key` is allowed right now,
    /// recording it toward the current window if so. Releases the `DashMap`
    /// shard lock before awaiting the inner `Mutex`, mirroring the teacher
    /// limiter's `Arc`-clone-then-await pattern.
    pub async fn check(&self, client_key: &str) -> bool {
        if self.max_requests == 0 {
            return false;
        }
        let state = self
            .keys
            .entry(client_key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WindowState {
                    window_start: Instant::now(),
                    count: 0,
                }))
            })
            .clone();

        let mut guard = state.lock().await;
        let now = Instant::now();
        if now.duration_since(guard.window_start) >= self.window {
            guard.window_start = now;
            guard.count = 0;
        }
        if guard.count >= self.max_requests {
            return false;
        }
        guard.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_configured_max_then_rejects() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        assert!(limiter.check("alice").await);
        assert!(limiter.check("alice").await);
        assert!(limiter.check("alice").await);
        assert!(!limiter.check("alice").await);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_a_budget() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("alice").await);
        assert!(limiter.check("bob").await);
        assert!(!limiter.check("alice").await);
    }

    #[tokio::test]
    async fn window_resets_after_it_elapses() {
        tokio::time::pause();
        let limiter = RateLimiter::new(Duration::from_millis(100), 1);
        assert!(limiter.check("alice").await);
        assert!(!limiter.check("alice").await);
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(limiter.check("alice").await);
    }

    #[tokio::test]
    async fn zero_max_requests_rejects_everything() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 0);
        assert!(!limiter.check("alice").await);
    }
}
