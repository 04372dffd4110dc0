use std::time::Duration;

/// Configuration for the reconciliation worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Time between the start of two polling cycles.
    pub poll_interval: Duration,
    /// Number of concurrent handlers per cycle.
    pub pool_size: usize,
    /// Pause before every accrual request.
    pub request_delay: Duration,
    /// Deadline for each ledger operation.
    pub ledger_timeout: Duration,
    /// Minimum cool-down after the accrual service rate-limits us.
    pub retry_after_min: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            pool_size: 5,
            request_delay: Duration::from_millis(100),
            ledger_timeout: Duration::from_secs(3),
            retry_after_min: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the polling interval; zero is raised to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sets the handler pool size (at least 1).
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    pub fn with_retry_after_min(mut self, min: Duration) -> Self {
        self.retry_after_min = min;
        self
    }

    /// Cool-down for a rate-limit reply carrying an optional server hint.
    pub fn cool_down(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.map_or(self.retry_after_min, |hint| hint.max(self.retry_after_min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.request_delay, Duration::from_millis(100));
        assert_eq!(config.ledger_timeout, Duration::from_secs(3));
        assert_eq!(config.retry_after_min, Duration::from_secs(60));
    }

    #[test]
    fn test_builders_clamp() {
        let config = WorkerConfig::new()
            .with_pool_size(0)
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_cool_down_uses_larger_of_hint_and_minimum() {
        let config = WorkerConfig::new().with_retry_after_min(Duration::from_secs(60));
        assert_eq!(config.cool_down(None), Duration::from_secs(60));
        assert_eq!(config.cool_down(Some(Duration::from_secs(5))), Duration::from_secs(60));
        assert_eq!(config.cool_down(Some(Duration::from_secs(90))), Duration::from_secs(90));
    }
}
