//! Exponential backoff (no jitter), used to pace worker spawn retries.

use std::time::Duration;

/// Controls how the pool retries a failed worker spawn.
#[derive(Debug, Clone)]
pub struct SpawnBackoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each consecutive failure.
    pub backoff_factor: f64,
}

impl Default for SpawnBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl SpawnBackoff {
    pub fn from_config(cfg: &forge_domain::config::WorkerPoolConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.spawn_retry_delay_ms),
            max_delay: Duration::from_millis(cfg.spawn_retry_delay_max_ms),
            backoff_factor: 2.0,
        }
    }

    /// Delay for the given number of *consecutive* failures (1-indexed,
    /// matching the pool's `consecutive_failures` counter).
    pub fn delay_for_failures(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(consecutive_failures as i32 - 1);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_failures_means_no_delay() {
        let b = SpawnBackoff::default();
        assert_eq!(b.delay_for_failures(0), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_per_failure() {
        let b = SpawnBackoff::default();
        let d1 = b.delay_for_failures(1);
        let d2 = b.delay_for_failures(2);
        let d3 = b.delay_for_failures(3);
        assert_eq!(d1, Duration::from_millis(500));
        assert_eq!(d2, Duration::from_millis(1000));
        assert_eq!(d3, Duration::from_millis(2000));
    }

    #[test]
    fn delay_capped_at_max() {
        let b = SpawnBackoff {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            backoff_factor: 10.0,
        };
        assert_eq!(b.delay_for_failures(10), Duration::from_secs(30));
    }
}
