use rand::Rng;
use std::time::Duration;

/// A delay policy between consecutive attempts.
pub trait Backoff {
    /// Delay before the next attempt. Increments the attempt counter.
    fn next_delay(&mut self) -> Duration;

    /// Forget previous attempts (call after a success).
    fn reset(&mut self);

    /// Number of delays handed out since the last reset.
    fn attempt(&self) -> u32;
}

/// Constant delay, used for stream reconnects where the venue
/// rather than load is the usual cause of a drop.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
    attempt: u32,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Exponential backoff with jitter.
///
/// Formula: min(max_delay, base * 2^attempt) + random_jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.1,
            attempt: 0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff.
    ///
    /// # Arguments
    /// * `base` - Initial delay duration
    /// * `max_delay` - Maximum delay cap
    /// * `jitter_factor` - Jitter as a fraction of delay (0.0 to 1.0). Negative values are clamped to 0.
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max_delay,
            // gen_range panics on an inverted range
            jitter_factor: jitter_factor.max(0.0),
            attempt: 0,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped_delay = exp_delay.min(self.max_delay);

        let jitter_range = capped_delay.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_secs = (capped_delay.as_secs_f64() + jitter).max(0.0);

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_secs_f64(final_secs)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Caps a backoff policy at a fixed number of attempts.
///
/// `next()` yields a delay while retries remain and `None` once the
/// budget is spent. The first attempt is free: a budget of 3 allows the
/// initial try plus two retries.
#[derive(Debug, Clone)]
pub struct RetryBudget<B> {
    backoff: B,
    max_attempts: u32,
    used: u32,
}

impl<B: Backoff> RetryBudget<B> {
    pub fn new(backoff: B, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: max_attempts.max(1),
            used: 1,
        }
    }

    /// Delay before the next retry, or `None` when exhausted.
    pub fn next(&mut self) -> Option<Duration> {
        if self.used >= self.max_attempts {
            return None;
        }
        self.used += 1;
        Some(self.backoff.next_delay())
    }

    /// Attempts made so far, including the first.
    pub fn attempts(&self) -> u32 {
        self.used
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff_never_grows() {
        let mut backoff = FixedBackoff::new(Duration::from_secs(5));

        for _ in 0..50 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(backoff.attempt(), 50);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_exponential_backoff_doubles_then_caps() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10), 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff_jitter_within_bounds() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(60), 0.2);

        let secs = backoff.next_delay().as_secs_f64();
        assert!((8.0..=12.0).contains(&secs), "delay was {}", secs);
    }

    #[test]
    fn test_negative_jitter_clamped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), -0.5);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_budget_counts_first_attempt() {
        let mut budget = RetryBudget::new(FixedBackoff::new(Duration::from_millis(10)), 3);

        assert_eq!(budget.attempts(), 1);
        assert_eq!(budget.next(), Some(Duration::from_millis(10)));
        assert_eq!(budget.next(), Some(Duration::from_millis(10)));
        assert_eq!(budget.next(), None);
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn test_retry_budget_of_one_never_retries() {
        let mut budget = RetryBudget::new(FixedBackoff::default(), 1);
        assert_eq!(budget.next(), None);

        let mut zero = RetryBudget::new(FixedBackoff::default(), 0);
        assert_eq!(zero.max_attempts(), 1);
        assert_eq!(zero.next(), None);
    }
}
