//! Rate-limit retry management with exponential backoff, jitter and a total budget

use rand::Rng;
use std::time::{Duration, Instant};
use zohocrm_config::RetrySettings;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryManager {
    policy: RetryPolicy,
    /// Maximum total time to spend on retries (including delays)
    max_total_duration: Duration,
    use_jitter: bool,
}

/// Result of retry decision making
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Retry the operation after the specified delay
    Retry { delay: Duration, attempt_number: u32 },
    /// Stop retrying and return the error
    Stop {
        reason: String,
        final_attempt: u32,
        total_elapsed: Duration,
    },
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            max_total_duration: Duration::from_secs(60),
            use_jitter: true,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(RetryPolicy {
            max_retries: settings.max_retries,
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
        })
        .with_total_timeout(Duration::from_secs(settings.total_timeout_secs))
        .with_jitter(settings.jitter)
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.max_total_duration = timeout;
        self
    }

    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Decide whether a rate-limited request gets another attempt.
    ///
    /// `attempt_number` counts retries already made. A `Retry-After` hint from
    /// the server wins when it is longer than the computed backoff.
    pub fn should_retry(
        &self,
        attempt_number: u32,
        start_time: Instant,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        let elapsed = start_time.elapsed();

        if attempt_number >= self.policy.max_retries {
            return RetryDecision::Stop {
                reason: format!(
                    "Maximum retry attempts ({}) exceeded",
                    self.policy.max_retries
                ),
                final_attempt: attempt_number,
                total_elapsed: elapsed,
            };
        }

        let backoff = self.calculate_delay(attempt_number);
        let delay = match retry_after {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        };

        if elapsed + delay > self.max_total_duration {
            return RetryDecision::Stop {
                reason: format!(
                    "Next retry delay ({}ms) would exceed total retry budget",
                    delay.as_millis()
                ),
                final_attempt: attempt_number,
                total_elapsed: elapsed,
            };
        }

        RetryDecision::Retry {
            delay,
            attempt_number: attempt_number + 1,
        }
    }

    /// Delay before retry `attempt_number + 1`
    pub(crate) fn calculate_delay(&self, attempt_number: u32) -> Duration {
        let base_delay = self.policy.initial_delay_ms as f64
            * self.policy.backoff_multiplier.powi(attempt_number as i32);
        let capped_delay = base_delay.min(self.policy.max_delay_ms as f64);

        let final_delay = if self.use_jitter {
            // Full jitter: random between 0 and delay
            rand::thread_rng().gen::<f64>() * capped_delay
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
