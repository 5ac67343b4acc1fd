//! Per-client request throttling for the IPC surface

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Token bucket per IPC client, refilled continuously.
///
/// A client may burst up to `burst` requests, after which it earns one
/// request back every `per / burst`.
#[derive(Debug)]
pub struct RateLimiter {
    burst: f64,
    /// Tokens earned per second
    rate: f64,
    buckets: HashMap<ClientId, Bucket>,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl RateLimiter {
    /// Allow `burst` requests per `per`
    pub fn new(burst: u32, per: Duration) -> Self {
        let burst = f64::from(burst.max(1));
        let per = per.as_secs_f64().max(f64::EPSILON);
        Self {
            burst,
            rate: burst / per,
            buckets: HashMap::new(),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate limited
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    pub fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let burst = self.burst;
        let bucket = self.buckets.entry(client_id.clone()).or_insert(Bucket {
            tokens: burst,
            updated: now,
        });

        let earned = now.saturating_duration_since(bucket.updated).as_secs_f64() * self.rate;
        bucket.tokens = (bucket.tokens + earned).min(burst);
        bucket.updated = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Forget a disconnected client
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.buckets.remove(client_id);
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_throttle() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(&client, t0));
        }
        assert!(!limiter.check_at(&client, t0));
    }

    #[test]
    fn tokens_come_back_gradually() {
        let mut limiter = RateLimiter::new(4, Duration::from_secs(1));
        let client = ClientId::new();
        let t0 = Instant::now();

        for _ in 0..4 {
            assert!(limiter.check_at(&client, t0));
        }
        // One token every 250ms
        assert!(!limiter.check_at(&client, t0 + Duration::from_millis(100)));
        assert!(limiter.check_at(&client, t0 + Duration::from_millis(300)));
        assert!(!limiter.check_at(&client, t0 + Duration::from_millis(300)));

        // Never more than the burst, however long the pause
        let later = t0 + Duration::from_secs(60);
        for _ in 0..4 {
            assert!(limiter.check_at(&client, later));
        }
        assert!(!limiter.check_at(&client, later));
    }

    #[test]
    fn clients_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a = ClientId::new();
        let b = ClientId::new();
        let t0 = Instant::now();

        assert!(limiter.check_at(&a, t0));
        assert!(!limiter.check_at(&a, t0));
        assert!(limiter.check_at(&b, t0));
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.remove_client(&a);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.check_at(&a, t0));
    }
}
