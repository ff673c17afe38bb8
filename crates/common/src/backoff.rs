use rand::Rng;
use std::time::Duration;

/// Bounded retry policy for transient exchange failures.
///
/// Delay for attempt `n` (zero-based) is `min(max_delay, base * 2^n)` plus
/// a symmetric jitter of `jitter_factor` of that delay. Callers stop once
/// `should_retry` returns false.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. Negative jitter is clamped to zero.
    pub fn new(max_retries: u32, base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            max_retries,
            base,
            max_delay,
            jitter_factor: jitter_factor.max(0.0),
        }
    }

    /// A policy with no jitter, so delays are exact.
    pub fn deterministic(max_retries: u32, base: Duration) -> Self {
        Self::new(max_retries, base, Duration::from_secs(60), 0.0)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another attempt is allowed after `attempt` retries already made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let capped_delay = exp_delay.min(self.max_delay);

        let jitter_range = capped_delay.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_secs_f64((capped_delay.as_secs_f64() + jitter).max(0.0))
    }
}
