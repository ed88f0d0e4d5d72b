//! Exponential backoff with jitter for step retries and session creation.

use std::time::Duration;

/// Calculates capped exponential delays, optionally jittered to avoid
/// thundering-herd retries against the same remote resource.
///
/// ```
/// use director_core::orchestration::backoff::BackoffCalculator;
/// use std::time::Duration;
///
/// let backoff = BackoffCalculator::new(Duration::from_secs(1), Duration::from_secs(30))
///     .without_jitter();
/// assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
/// assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
/// assert_eq!(backoff.delay_for(10), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: true,
        }
    }

    /// Disable jitter, making delays deterministic
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before the retry following attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(31);
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max);

        if self.jitter && !delay.is_zero() {
            // up to ±15% around the exponential delay, still capped
            let factor = 0.85 + fastrand::f64() * 0.3;
            let jittered = delay.as_secs_f64() * factor;
            Duration::from_secs_f64(jittered).min(self.max)
        } else {
            delay
        }
    }
}
