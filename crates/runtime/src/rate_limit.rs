use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request counter per API key. In-memory and
/// per-instance — cluster-wide limiting is a documented non-goal.
#[derive(Default)]
pub struct RateLimiter {
    counters: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `key_id` is still under `cap_per_minute` trailing-60s
    /// requests, recording this request as a side effect.
    pub fn check(&self, key_id: &str, cap_per_minute: u32) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock().expect("rate limiter lock poisoned");
        let entry = counters.entry(key_id.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() as u32 >= cap_per_minute {
            return false;
        }
        entry.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_cap() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check("key-a", 5));
        }
    }

    #[test]
    fn rejects_request_over_cap() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("key-b", 3));
        }
        assert!(!limiter.check("key-b", 3));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..2 {
            assert!(limiter.check("key-c", 2));
        }
        assert!(!limiter.check("key-c", 2));
        assert!(limiter.check("key-d", 2));
    }
}
