//! Sliding-window rate limiter
//!
//! Used by the public live chat endpoints, keyed both by visitor id and by
//! client IP so rotating one of them does not lift the limit.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-key sliding window limiter
pub struct RateLimiter {
    hits: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(RwLock::new(HashMap::new())),
            limit,
            window,
        }
    }

    /// `limit` requests per minute
    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::minutes(1))
    }

    /// Record a request for `key` unless it is over the limit.
    ///
    /// Returns false when the request must be rejected. Rejected requests are
    /// not recorded.
    pub async fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Utc::now()).await
    }

    pub async fn try_acquire_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut hits = self.hits.write().await;
        let cutoff = now - self.window;

        let key_hits = hits.entry(key.to_string()).or_default();
        key_hits.retain(|time| *time > cutoff);

        if key_hits.len() >= self.limit {
            return false;
        }
        key_hits.push(now);
        true
    }

    /// Check a visitor and its IP together; both must have room
    pub async fn try_acquire_visitor(&self, visitor_id: &str, ip: Option<IpAddr>) -> bool {
        let now = Utc::now();
        if !self.try_acquire_at(&format!("visitor:{}", visitor_id), now).await {
            return false;
        }
        match ip {
            Some(ip) => self.try_acquire_at(&format!("ip:{}", ip), now).await,
            None => true,
        }
    }

    /// Drop expired entries (should be called periodically)
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.hits.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_limit_per_key() {
        let limiter = RateLimiter::per_minute(3);

        for _ in 0..3 {
            assert!(limiter.try_acquire("visitor:a").await);
        }
        assert!(!limiter.try_acquire("visitor:a").await);
        assert!(limiter.try_acquire("visitor:b").await);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::per_minute(2);
        let start = Utc::now();

        assert!(limiter.try_acquire_at("k", start).await);
        assert!(limiter.try_acquire_at("k", start + Duration::seconds(30)).await);
        assert!(!limiter.try_acquire_at("k", start + Duration::seconds(59)).await);

        // The first hit has left the window.
        assert!(limiter.try_acquire_at("k", start + Duration::seconds(61)).await);
    }

    #[tokio::test]
    async fn test_ip_shared_across_visitors() {
        let limiter = RateLimiter::per_minute(2);
        let ip = IpAddr::from_str("203.0.113.9").unwrap();

        assert!(limiter.try_acquire_visitor("visitor-one", Some(ip)).await);
        assert!(limiter.try_acquire_visitor("visitor-two", Some(ip)).await);
        assert!(!limiter.try_acquire_visitor("visitor-three", Some(ip)).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_keys() {
        let limiter = RateLimiter::per_minute(5);
        limiter
            .try_acquire_at("old", Utc::now() - Duration::minutes(5))
            .await;
        limiter.try_acquire("fresh").await;

        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 1);
    }
}
