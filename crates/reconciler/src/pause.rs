//! Cool-down deadline shared by all handlers of a cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A deadline before which no handler may call the accrual service.
///
/// Extending never shortens an existing pause.
#[derive(Debug, Clone, Default)]
pub struct SharedPause {
    until: Arc<Mutex<Option<Instant>>>,
}

impl SharedPause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the deadline to at least `now + duration`.
    pub fn extend(&self, duration: Duration) {
        let candidate = Instant::now() + duration;
        let mut until = self.until.lock();
        if until.is_none_or(|current| current < candidate) {
            *until = Some(candidate);
        }
    }

    /// Time left until the deadline, if it is still in the future.
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = (*self.until.lock())?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    /// Waits until the deadline has passed. Returns `false` if `shutdown`
    /// fired first.
    pub async fn wait(&self, shutdown: &CancellationToken) -> bool {
        // Loop because another handler may extend the deadline meanwhile.
        while let Some(remaining) = self.remaining() {
            tokio::select! {
                () = shutdown.cancelled() => return false,
                () = tokio::time::sleep(remaining) => {}
            }
        }
        !shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_pause_returns_immediately() {
        let pause = SharedPause::new();
        assert_eq!(pause.remaining(), None);
        assert!(pause.wait(&CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_extend_never_shortens() {
        let pause = SharedPause::new();
        pause.extend(Duration::from_secs(60));
        pause.extend(Duration::from_secs(1));
        let remaining = pause.remaining().unwrap();
        assert!(remaining > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_wait_sleeps_until_deadline() {
        let pause = SharedPause::new();
        pause.extend(Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert!(pause.wait(&CancellationToken::new()).await);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(pause.remaining(), None);
    }

    #[tokio::test]
    async fn test_wait_aborts_on_shutdown() {
        let pause = SharedPause::new();
        pause.extend(Duration::from_secs(60));
        let shutdown = CancellationToken::new();

        let waiter = {
            let pause = pause.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pause.wait(&shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!finished);
    }
}
