use std::time::Duration;

/// Exponential backoff with full jitter over the upper half of the window.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(15),
            max: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Whether another delivery attempt is allowed after `attempt` failures.
    /// Attempts beyond the maximum are permanent failures.
    pub fn retryable(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the next attempt. `attempt` counts completed deliveries,
    /// starting at 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .min
            .saturating_mul(1u32 << exp)
            .min(self.max);
        let half = base / 2;
        let jitter_millis = rand::thread_rng().gen_range(0..=half.as_millis().max(1) as u64);
        half + Duration::from_millis(jitter_millis)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn delays_grow_and_cap_within_the_window() {
        let backoff = Backoff::default();
        for attempt in 1..=8 {
            let delay = backoff.delay(attempt);
            assert!(delay >= backoff.min / 2, "attempt {attempt}: {delay:?}");
            assert!(delay <= backoff.max, "attempt {attempt}: {delay:?}");
        }
        // The first retry sits in the 7.5..=15 s window.
        let first = backoff.delay(1);
        assert!(first >= Duration::from_millis(7_500));
        assert!(first <= Duration::from_secs(15));
    }

    #[test]
    fn attempts_beyond_the_maximum_are_permanent() {
        let backoff = Backoff::default();
        assert!(backoff.retryable(1));
        assert!(backoff.retryable(4));
        assert!(!backoff.retryable(5));
        assert!(!backoff.retryable(9));
    }
}
