//! Sliding-window scrape limiter with exponential backoff.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Outcome of [`RateLimiter::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The window is full; a backoff until `until` has started.
    Limited { until: DateTime<Utc> },
    /// Still inside a backoff window from an earlier violation.
    BackingOff { until: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct RateLimitState {
    recent: VecDeque<DateTime<Utc>>,
    backoff_until: Option<DateTime<Utc>>,
    violations: u32,
}

/// Caps scrapes to `max_scrapes` per trailing `window`.
///
/// Exceeding the cap enters a backoff of `backoff_base * 2^(n-1)` for the
/// n-th consecutive violation, capped at `backoff_max`. A successful acquire
/// resets the violation count.
#[derive(Debug)]
pub struct RateLimiter {
    max_scrapes: usize,
    window: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new(max_scrapes: usize, window: Duration, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self { max_scrapes, window, backoff_base, backoff_max, state: Mutex::new(RateLimitState::default()) }
    }

    /// Record a scrape at `now` if allowed.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> RateDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(until) = state.backoff_until {
            if now < until {
                return RateDecision::BackingOff { until };
            }
            state.backoff_until = None;
        }

        let window_start = now - self.window;
        while state.recent.front().is_some_and(|t| *t <= window_start) {
            state.recent.pop_front();
        }

        if state.recent.len() >= self.max_scrapes {
            state.violations = state.violations.saturating_add(1);
            let until = now + self.backoff_for(state.violations);
            state.backoff_until = Some(until);
            return RateDecision::Limited { until };
        }

        state.recent.push_back(now);
        state.violations = 0;
        RateDecision::Allowed
    }

    fn backoff_for(&self, violations: u32) -> Duration {
        let factor = 1i32 << violations.saturating_sub(1).min(16);
        let backoff = self.backoff_base.checked_mul(factor).unwrap_or(self.backoff_max);
        backoff.min(self.backoff_max)
    }

    /// Scrapes counted in the window ending at `now`.
    pub fn recent_count(&self, now: DateTime<Utc>) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window_start = now - self.window;
        state.recent.iter().filter(|t| **t > window_start).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(5, Duration::seconds(60), Duration::seconds(5), Duration::seconds(60))
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = limiter();
        let start = Utc::now();
        for i in 0..5 {
            assert_eq!(limiter.try_acquire(start + Duration::seconds(i)), RateDecision::Allowed);
        }
        assert!(matches!(limiter.try_acquire(start + Duration::seconds(6)), RateDecision::Limited { .. }));
        assert_eq!(limiter.recent_count(start + Duration::seconds(6)), 5);
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..5 {
            assert_eq!(limiter.try_acquire(start), RateDecision::Allowed);
        }
        assert_eq!(limiter.try_acquire(start + Duration::seconds(60)), RateDecision::Allowed);
    }

    #[test]
    fn test_backoff_blocks_then_expires() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..5 {
            limiter.try_acquire(start);
        }
        let limited_at = start + Duration::seconds(1);
        assert_eq!(
            limiter.try_acquire(limited_at),
            RateDecision::Limited { until: limited_at + Duration::seconds(5) }
        );
        assert!(matches!(
            limiter.try_acquire(limited_at + Duration::seconds(4)),
            RateDecision::BackingOff { .. }
        ));
        // Backoff over and the window has slid past the burst.
        assert_eq!(limiter.try_acquire(start + Duration::seconds(61)), RateDecision::Allowed);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let limiter = limiter();
        assert_eq!(limiter.backoff_for(1), Duration::seconds(5));
        assert_eq!(limiter.backoff_for(2), Duration::seconds(10));
        assert_eq!(limiter.backoff_for(3), Duration::seconds(20));
        assert_eq!(limiter.backoff_for(5), Duration::seconds(60));
        assert_eq!(limiter.backoff_for(40), Duration::seconds(60));
    }

    #[test]
    fn test_consecutive_violations_grow_backoff() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..5 {
            limiter.try_acquire(start);
        }
        let first = start + Duration::seconds(1);
        assert_eq!(limiter.try_acquire(first), RateDecision::Limited { until: first + Duration::seconds(5) });
        let second = first + Duration::seconds(5);
        assert_eq!(limiter.try_acquire(second), RateDecision::Limited { until: second + Duration::seconds(10) });
    }
}
