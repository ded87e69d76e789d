//! Admission control
//!
//! Sliding-window request counter keyed by source (peer IP). One mutex
//! guards every window; it is never held across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Per-source sliding-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit a request from `source` if it is under its limit.
    ///
    /// Only admitted requests count against the window.
    pub fn is_allowed(&self, source: &str) -> bool {
        self.check_at(source, Instant::now())
    }

    /// Requests `source` may still make in the current window
    pub fn get_remaining_requests(&self, source: &str) -> usize {
        self.remaining_at(source, Instant::now())
    }

    /// Forget sources with no requests inside the window
    pub fn purge_idle(&self) -> usize {
        self.purge_at(Instant::now())
    }

    /// Number of sources currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_at(&self, source: &str, now: Instant) -> bool {
        let mut requests = self.lock();
        let window = requests.entry(source.to_string()).or_default();
        prune(window, now, self.window);

        if window.len() >= self.max_requests {
            tracing::debug!(source, limit = self.max_requests, "Rate limit exceeded");
            return false;
        }
        window.push_back(now);
        true
    }

    fn remaining_at(&self, source: &str, now: Instant) -> usize {
        let requests = self.lock();
        let live = requests
            .get(source)
            .map(|window| window.iter().filter(|&&t| within(t, now, self.window)).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(live)
    }

    fn purge_at(&self, now: Instant) -> usize {
        let mut requests = self.lock();
        let before = requests.len();
        requests.retain(|_, window| {
            prune(window, now, self.window);
            !window.is_empty()
        });
        before - requests.len()
    }
}

fn within(at: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(at) <= window
}

/// Drop timestamps older than the window. Entries are in arrival order.
fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(&oldest) = window.front() {
        if within(oldest, now, span) {
            break;
        }
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_exactly_max_requests() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let now = Instant::now();

        let admitted = (0..8).filter(|_| limiter.check_at("10.0.0.1", now)).count();
        assert_eq!(admitted, 5);
        assert_eq!(limiter.remaining_at("10.0.0.1", now), 0);
    }

    #[test]
    fn test_sources_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now));
        assert!(limiter.check_at("b", now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("a", start));
        assert!(limiter.check_at("a", start + Duration::from_secs(5)));
        assert!(!limiter.check_at("a", start + Duration::from_secs(9)));

        // First entry has aged out
        assert!(limiter.check_at("a", start + Duration::from_secs(11)));
        assert_eq!(limiter.remaining_at("a", start + Duration::from_secs(11)), 0);
        assert_eq!(limiter.remaining_at("a", start + Duration::from_secs(30)), 2);
    }

    #[test]
    fn test_rejections_do_not_count() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("a", start));
        for s in 1..10 {
            assert!(!limiter.check_at("a", start + Duration::from_secs(s)));
        }
        assert!(limiter.check_at("a", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_remaining_is_non_destructive() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert_eq!(limiter.get_remaining_requests("new"), 3);
        assert_eq!(limiter.tracked_sources(), 0);

        assert!(limiter.is_allowed("new"));
        assert_eq!(limiter.get_remaining_requests("new"), 2);
        assert_eq!(limiter.get_remaining_requests("new"), 2);
    }

    #[test]
    fn test_purge_idle_sources() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(8));

        assert_eq!(limiter.purge_at(start + Duration::from_secs(15)), 1);
        assert_eq!(limiter.tracked_sources(), 1);
    }

    #[test]
    fn test_from_config_defaults() {
        let limiter = RateLimiter::from_config(&RateLimitConfig::default());
        assert_eq!(limiter.max_requests(), 100);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }
}
