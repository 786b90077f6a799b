use std::time::Duration;

use pager_shared::constants::{RECONNECT_INITIAL_MS, RECONNECT_MAX_MS};

/// Exponential backoff schedule for reconnect attempts.
///
/// The nominal schedule is monotonically non-decreasing and capped at `max`;
/// jitter is added on top of the nominal delay so a fleet of clients does not
/// redial a recovering broker in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the nominal delay added as random jitter (0.0 disables).
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(RECONNECT_INITIAL_MS),
            max: Duration::from_millis(RECONNECT_MAX_MS),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// The nominal (jitter-free) delay before the given attempt, 0-indexed.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial.as_secs_f64() * exp;
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// The jittered delay before the given attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = base.as_secs_f64() * self.jitter * rand::random::<f64>();
        base + Duration::from_secs_f64(spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_base_delay_monotonic() {
        let p = policy(0.0);
        let mut last = Duration::ZERO;
        for attempt in 0..20 {
            let d = p.base_delay(attempt);
            assert!(d >= last, "delay decreased at attempt {attempt}");
            last = d;
        }
    }

    #[test]
    fn test_base_delay_capped() {
        let p = policy(0.0);
        assert_eq!(p.base_delay(30), Duration::from_secs(5));
        assert_eq!(p.base_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let p = policy(0.0);
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_bounded() {
        let p = policy(0.25);
        for attempt in 0..10 {
            let base = p.base_delay(attempt);
            for _ in 0..50 {
                let d = p.delay(attempt);
                assert!(d >= base);
                assert!(d.as_secs_f64() <= base.as_secs_f64() * 1.25 + f64::EPSILON);
            }
        }
    }
}
