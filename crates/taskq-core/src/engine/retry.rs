//! Retry policy: decides backoff delays.

use std::time::Duration;

/// Retry policy for failed tasks.
///
/// The default is plain exponential backoff with no cap and no jitter:
/// `delay = base_delay * multiplier^(retry_count - 1)`, i.e. 2s, 4s, 8s, ...
/// Jitter and a cap are opt-in.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,

    /// Fraction (0.0..=1.0) of the delay that may be randomly added on top.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: None,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Deterministic part of the delay for a task that has failed
    /// `retry_count` times (1-indexed; 0 is treated as 1).
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 3: 8s
    pub fn base_backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Delay to apply before the next attempt, jitter included.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let base = self.base_backoff(retry_count);
        if self.jitter <= 0.0 {
            return base;
        }
        let extra = Duration::try_from_secs_f64(
            base.as_secs_f64() * self.jitter * rand::random::<f64>(),
        )
        .unwrap_or(Duration::MAX);
        base.saturating_add(extra)
    }
}
