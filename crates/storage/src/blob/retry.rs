use std::time::Duration;

use multireact_core::config::StorageConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Per-call deadline; an expired call counts as a transient failure.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            max_attempts: storage.retry.max_attempts,
            base_delay_ms: storage.retry.base_delay_ms,
            max_delay_ms: storage.retry.max_delay_ms,
            timeout: Duration::from_secs(storage.timeout_secs),
        }
    }

    /// No waiting between attempts; used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0, ..Self::default() }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the `failures`-th consecutive failure (zero-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}
