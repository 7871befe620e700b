use std::time::Duration;

use rand::Rng;

/// Backoff policy for history-load retries and live-feed resubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True once `attempt` retries have been spent.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Deterministic exponential delay for the given zero-based attempt,
    /// capped at the maximum delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// [`delay_for_attempt`](Self::delay_for_attempt) plus up to 25% random
    /// jitter, still capped at the maximum delay.
    pub fn jittered_delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt).as_millis() as u64;
        let jitter_cap = base / 4;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(500, 30_000, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = RetryPolicy::new(250, 8_000, 5);
        assert_eq!(
            policy.delay_for_attempt(0),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn scales_exponentially_for_attempts() {
        let policy = RetryPolicy::new(100, 10_000, 5);
        assert_eq!(
            policy.delay_for_attempt(3),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn caps_delay_at_max() {
        let policy = RetryPolicy::new(1_000, 4_000, 5);
        assert_eq!(
            policy.delay_for_attempt(5),
            Duration::from_millis(4_000)
        );
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_delay() {
        let policy = RetryPolicy::new(400, 30_000, 5);
        for attempt in 0..4 {
            let base = policy.delay_for_attempt(attempt);
            for _ in 0..32 {
                let jittered = policy.jittered_delay_for_attempt(attempt);
                assert!(jittered >= base);
                assert!(jittered <= base + base / 4);
            }
        }
    }

    #[test]
    fn jitter_never_exceeds_the_cap() {
        let policy = RetryPolicy::new(1_000, 1_000, 5);
        for _ in 0..32 {
            assert!(policy.jittered_delay_for_attempt(6) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn exhausts_after_configured_attempts() {
        let policy = RetryPolicy::new(100, 1_000, 3);
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn always_allows_at_least_one_attempt() {
        let policy = RetryPolicy::new(100, 1_000, 0);
        assert_eq!(policy.max_attempts(), 1);
    }
}
