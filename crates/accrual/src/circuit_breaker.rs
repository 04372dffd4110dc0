//! Three-state circuit breaker guarding calls to the accrual service.
//!
//! Closed: calls pass through and consecutive failures are counted.
//! Open: calls are rejected without touching the service until the cooldown
//! elapses. Half-open: a limited number of trial calls test recovery; enough
//! consecutive successes close the circuit, any failure reopens it.
//!
//! Every transition starts a new generation. A call is admitted under the
//! current generation and its result is ignored once the generation moved on.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit (default 5).
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing trial calls (default 30s).
    pub cooldown: Duration,
    /// Trial calls allowed while half-open; this many consecutive successes
    /// close the circuit (default 3).
    pub trial_count: u32,
    /// Name used in logs and metric labels.
    pub name: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            trial_count: 3,
            name: "accrual".to_string(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_trial_count(mut self, trials: u32) -> Self {
        self.trial_count = trials.max(1);
        self
    }
}

/// Ticket for one admitted call, returned by [`CircuitBreaker::allow_request`].
///
/// Pass it back to `record_success`, `record_failure` or `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    generation: u64,
    trial: bool,
}

impl Admission {
    /// Whether the call was admitted as a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

struct InnerState {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_attempts: u32,
    trial_successes: u32,
}

/// Thread-safe circuit breaker, shared by cloning.
///
/// All counters live behind one mutex: a state transition touches several
/// fields at once and the critical sections never await.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<InnerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        info!(
            name = %config.name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown.as_millis() as u64,
            trial_count = config.trial_count,
            "circuit breaker created"
        );

        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(InnerState {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                trial_attempts: 0,
                trial_successes: 0,
            })),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open circuit whose cooldown has elapsed reports
    /// `HalfOpen` even before the next request performs the transition.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        if inner.state == CircuitState::Open && self.cooldown_elapsed(&inner) {
            return CircuitState::HalfOpen;
        }
        inner.state
    }

    /// Decides whether a call may go through, performing the
    /// open → half-open transition when the cooldown has elapsed.
    ///
    /// Returns `None` when the call is rejected.
    pub fn allow_request(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if !self.cooldown_elapsed(&inner) {
                    return None;
                }
                self.transition_to(&mut inner, CircuitState::HalfOpen);
                inner.trial_attempts = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_attempts >= self.config.trial_count {
                    return None;
                }
                inner.trial_attempts += 1;
                true
            }
        };

        Some(Admission {
            generation: inner.generation,
            trial,
        })
    }

    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if admission.generation != inner.generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.trial_count {
                    self.transition_to(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if admission.generation != inner.generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Gives back the trial slot of a call that finished without a result.
    pub fn release(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if admission.trial
            && admission.generation == inner.generation
            && inner.state == CircuitState::HalfOpen
        {
            inner.trial_attempts = inner.trial_attempts.saturating_sub(1);
        }
    }

    /// Runs `f` under the breaker.
    ///
    /// Returns `Open` without calling `f` when the circuit rejects the call;
    /// otherwise records the result of `f` and passes it through.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.allow_request() else {
            metrics::counter!(
                "circuit_breaker_rejections_total",
                "name" => self.config.name.clone()
            )
            .increment(1);
            return Err(CircuitBreakerError::Open {
                name: self.config.name.clone(),
            });
        };

        // Releases the admission if this future is dropped mid-call.
        let mut guard = ReleaseOnDrop {
            breaker: self,
            admission: Some(admission),
        };

        let result = f().await;
        guard.admission = None;

        match result {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(admission);
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    fn cooldown_elapsed(&self, inner: &InnerState) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.config.cooldown)
    }

    fn transition_to(&self, inner: &mut InnerState, new_state: CircuitState) {
        let old_state = inner.state;
        inner.state = new_state;
        inner.generation = inner.generation.wrapping_add(1);

        match new_state {
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                warn!(
                    name = %self.config.name,
                    from = %old_state,
                    consecutive_failures = inner.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.trial_attempts = 0;
                inner.trial_successes = 0;
                info!(
                    name = %self.config.name,
                    trial_count = self.config.trial_count,
                    "circuit breaker half-open, allowing trial calls"
                );
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                info!(name = %self.config.name, "circuit breaker closed");
            }
        }

        metrics::counter!(
            "circuit_breaker_transitions_total",
            "name" => self.config.name.clone(),
            "from" => old_state.to_string(),
            "to" => new_state.to_string()
        )
        .increment(1);
    }
}

struct ReleaseOnDrop<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.release(admission);
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit rejected the call.
    Open { name: String },
    /// The guarded call itself failed.
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { name } => write!(f, "circuit breaker '{name}' is open"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for CircuitBreakerError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new("test")
            .with_failure_threshold(3)
            .with_cooldown(Duration::from_millis(100))
            .with_trial_count(2)
    }

    fn fail(cb: &CircuitBreaker) {
        let admission = cb.allow_request().unwrap();
        cb.record_failure(admission);
    }

    fn succeed(cb: &CircuitBreaker) {
        let admission = cb.allow_request().unwrap();
        cb.record_success(admission);
    }

    fn trip(cb: &CircuitBreaker) {
        for _ in 0..3 {
            fail(cb);
        }
    }

    #[test]
    fn initial_state_is_closed() {
        let cb = CircuitBreaker::new(test_config());
        assert_eq!(cb.state(), CircuitState::Closed);
        let admission = cb.allow_request().unwrap();
        assert!(!admission.is_trial());
    }

    #[test]
    fn trips_after_threshold() {
        let cb = CircuitBreaker::new(test_config());

        fail(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_request().is_none());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(test_config());

        fail(&cb);
        fail(&cb);
        succeed(&cb);
        fail(&cb);
        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request().is_some());
    }

    #[test]
    fn moves_to_half_open_after_cooldown() {
        let cb = CircuitBreaker::new(test_config());
        trip(&cb);
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(150));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let admission = cb.allow_request().unwrap();
        assert!(admission.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_limits_trial_requests() {
        let cb = CircuitBreaker::new(test_config());
        trip(&cb);
        std::thread::sleep(Duration::from_millis(150));

        assert!(cb.allow_request().is_some());
        assert!(cb.allow_request().is_some());
        assert!(cb.allow_request().is_none());
    }

    #[test]
    fn half_open_closes_after_consecutive_successes() {
        let cb = CircuitBreaker::new(test_config());
        trip(&cb);
        std::thread::sleep(Duration::from_millis(150));

        succeed(&cb);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request().is_some());
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(test_config());
        trip(&cb);
        std::thread::sleep(Duration::from_millis(150));

        fail(&cb);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_request().is_none());
    }

    #[test]
    fn late_result_from_closed_call_is_ignored_in_half_open() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("late")
                .with_failure_threshold(1)
                .with_cooldown(Duration::from_millis(50))
                .with_trial_count(1),
        );

        let slow = cb.allow_request().unwrap();
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(80));
        let trial = cb.allow_request().unwrap();
        assert!(trial.is_trial());

        cb.record_success(slow);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure(slow);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success(trial);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn late_failure_does_not_count_after_close() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new("late")
                .with_failure_threshold(1)
                .with_cooldown(Duration::from_millis(50))
                .with_trial_count(1),
        );
        fail(&cb);
        std::thread::sleep(Duration::from_millis(80));

        let trial = cb.allow_request().unwrap();
        cb.record_success(trial);
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(trial);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn released_trial_slot_can_be_reused() {
        let cb = CircuitBreaker::new(test_config().with_trial_count(1));
        trip(&cb);
        std::thread::sleep(Duration::from_millis(150));

        let trial = cb.allow_request().unwrap();
        assert!(cb.allow_request().is_none());

        cb.release(trial);
        assert!(cb.allow_request().is_some());
    }

    #[tokio::test]
    async fn dropped_trial_call_frees_its_slot() {
        let cb = CircuitBreaker::new(test_config().with_trial_count(1));
        trip(&cb);
        tokio::time::sleep(Duration::from_millis(150)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cb.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result: Result<i32, CircuitBreakerError<String>> = cb.call(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn call_short_circuits_when_open() {
        let cb = CircuitBreaker::new(test_config());

        let ok: Result<i32, CircuitBreakerError<String>> = cb.call(|| async { Ok(42) }).await;
        assert_eq!(ok.unwrap(), 42);

        for _ in 0..3 {
            let _: Result<i32, CircuitBreakerError<String>> =
                cb.call(|| async { Err("service down".to_string()) }).await;
        }

        let mut invoked = false;
        let result: Result<i32, CircuitBreakerError<String>> = cb
            .call(|| {
                invoked = true;
                async { Ok(42) }
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert!(!invoked);
    }

    #[test]
    fn config_builder_clamps_to_one() {
        let config = CircuitBreakerConfig::new("accrual")
            .with_failure_threshold(0)
            .with_trial_count(0)
            .with_cooldown(Duration::from_secs(60));

        assert_eq!(config.name, "accrual");
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.trial_count, 1);
        assert_eq!(config.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn error_display() {
        let err: CircuitBreakerError<String> = CircuitBreakerError::Open {
            name: "accrual".to_string(),
        };
        assert_eq!(err.to_string(), "circuit breaker 'accrual' is open");

        let err: CircuitBreakerError<String> =
            CircuitBreakerError::Inner("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
    }
}
