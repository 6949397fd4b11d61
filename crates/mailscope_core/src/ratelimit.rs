//! Per-address minimum-interval throttle

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use tracing::debug;

/// Allows one analysis per address per interval; a zero interval disables it
pub struct AddressLimiter {
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl AddressLimiter {
    pub fn new(interval: Duration) -> Self {
        // `with_period` rejects a zero duration, which doubles as "disabled".
        let limiter = Quota::with_period(interval).map(RateLimiter::keyed);
        Self { limiter }
    }

    /// Record a request for `address`; false when it arrived too soon
    pub fn check(&self, address: &str) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };

        match limiter.check_key(&address.to_string()) {
            Ok(()) => true,
            Err(not_until) => {
                debug!("Address throttled until {:?}", not_until);
                false
            }
        }
    }

    /// Forget addresses whose interval has fully elapsed
    pub fn prune(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_second_request_within_interval_rejected() {
        let limiter = AddressLimiter::new(Duration::from_secs(1));

        assert!(limiter.check("a@example.com"));
        assert!(!limiter.check("a@example.com"));
        // Other addresses are independent
        assert!(limiter.check("b@example.com"));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_spaced_requests_allowed() {
        let limiter = AddressLimiter::new(Duration::from_millis(50));

        assert!(limiter.check("a@example.com"));
        std::thread::sleep(Duration::from_millis(80));
        assert!(limiter.check("a@example.com"));
    }

    #[test]
    fn test_zero_interval_disables() {
        let limiter = AddressLimiter::new(Duration::ZERO);

        assert!(!limiter.is_enabled());
        for _ in 0..5 {
            assert!(limiter.check("a@example.com"));
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_prune_forgets_idle_addresses() {
        let limiter = AddressLimiter::new(Duration::from_millis(20));
        assert!(limiter.check("a@example.com"));
        std::thread::sleep(Duration::from_millis(50));

        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
