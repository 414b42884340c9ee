//! Retry strategy for the background executor.
//!
//! Exponential backoff with optional jitter. The in-process download manager
//! never retries on its own (retry there is an explicit `resume`); this
//! module only drives the one-shot background worker, which reports
//! transient failures as "retry later".

use rand::Rng;
use std::time::Duration;

/// Retry strategy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::core::config::retry::MAX_ATTEMPTS,
            initial_delay: crate::core::config::retry::initial_delay(),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter (deterministic delays, mainly for tests).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Computes the delay before retry attempt `attempt` (0-based).
    ///
    /// Exponential growth capped at `max_delay`, with up to 25% additive
    /// jitter when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let millis = if self.add_jitter {
            let jitter = rand::thread_rng().gen_range(0.0..0.25);
            capped * (1.0 + jitter)
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(100))
            .backoff_multiplier(2.0)
            .without_jitter();

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped_at_max() {
        let mut config = RetryConfig::new()
            .initial_delay(Duration::from_secs(30))
            .backoff_multiplier(10.0)
            .without_jitter();
        config.max_delay = Duration::from_secs(60);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::new().initial_delay(Duration::from_millis(100));
        for attempt in 0..3 {
            let delay = config.delay_for_attempt(attempt);
            let base = 100u64 * 2u64.pow(attempt);
            assert!(delay >= Duration::from_millis(base));
            assert!(delay <= Duration::from_millis(base + base / 4 + 1));
        }
    }
}
