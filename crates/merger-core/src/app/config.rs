//! Scheduler configuration.

use std::time::Duration;

/// Tuning knobs for the dispatch scheduler.
#[derive(Debug, Clone)]
pub struct MergerConfig {
    /// Cadence of the due-key poll loop.
    pub poll_interval: Duration,

    /// Upper bound on one batch execution; exceeding it classifies the
    /// task as timed out and abandons it.
    pub execution_timeout: Duration,

    /// Lifetime of the per-key dispatch lock. Must outlive
    /// `execution_timeout` so an abandoned execution stays fenced out
    /// until it can no longer be running.
    pub lock_ttl: Duration,

    /// Bound on simultaneously in-flight batch executions; excess due
    /// keys wait for the next cycle.
    pub max_in_flight: usize,

    /// Consecutive registry-poll failures tolerated before the loop gives
    /// up (store-wide connectivity loss).
    pub max_poll_failures: u32,
}

impl MergerConfig {
    /// Defaults for v1: snappy polling, generous lock headroom.
    pub fn default_v1() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            execution_timeout: Duration::from_secs(30),
            lock_ttl: Duration::from_secs(60),
            max_in_flight: 10,
            max_poll_failures: 10,
        }
    }
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self::default_v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lock_outlives_timeout() {
        let config = MergerConfig::default_v1();
        assert!(config.lock_ttl > config.execution_timeout);
        assert!(config.max_in_flight > 0);
    }
}
