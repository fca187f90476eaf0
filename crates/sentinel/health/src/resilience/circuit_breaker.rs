//! Circuit breaker pattern for resilience.
//!
//! Isolates a failing dependent service: after enough consecutive failures
//! the circuit opens, callers stop issuing real calls, and a scheduled timer
//! moves the circuit to half-open so a single trial call can close it again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,

    /// Circuit is open, callers must use their fallback.
    Open,

    /// Circuit is testing if the service has recovered.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    last_failure: Option<DateTime<Utc>>,
    last_transition: DateTime<Utc>,
    /// Bumped whenever a pending recovery timer is superseded.
    generation: u64,
    recovery_timer: Option<JoinHandle<()>>,
    /// Half-open deadline used when no runtime was available to arm a timer.
    half_open_due: Option<Instant>,
}

/// Circuit breaker for a single dependent service.
///
/// Transitions:
/// - Closed → Open once consecutive failures reach the threshold
/// - Open → Half-Open when the recovery timer fires
/// - Half-Open → Closed on a success, back to Open on a failure
pub struct CircuitBreaker {
    /// Service this breaker guards.
    service_name: String,

    /// Configuration.
    config: CircuitBreakerConfig,

    /// Mutable state, shared with the recovery timer task.
    core: Arc<Mutex<BreakerCore>>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker for a service.
    pub fn new(service_name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service_name: service_name.into(),
            config,
            core: Arc::new(Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                last_transition: Utc::now(),
                generation: 0,
                recovery_timer: None,
                half_open_due: None,
            })),
        }
    }

    /// Get the service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        let mut core = self.lock();
        self.promote_if_due(&mut core);
        core.state
    }

    /// Whether a real call may be attempted.
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut core = self.lock();
        self.promote_if_due(&mut core);

        core.failure_count = 0;
        core.success_count += 1;

        if core.state == CircuitState::HalfOpen {
            info!(
                service = %self.service_name,
                "Circuit breaker closing after successful trial call"
            );
            Self::transition(&mut core, CircuitState::Closed);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut core = self.lock();
        self.promote_if_due(&mut core);

        core.failure_count = core.failure_count.saturating_add(1);
        core.last_failure = Some(Utc::now());

        match core.state {
            CircuitState::Closed => {
                if core.failure_count >= self.config.failure_threshold {
                    warn!(
                        service = %self.service_name,
                        failures = core.failure_count,
                        "Circuit breaker opening due to failures"
                    );
                    Self::transition(&mut core, CircuitState::Open);
                    self.arm_recovery(&mut core);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    service = %self.service_name,
                    "Circuit breaker re-opening after half-open failure"
                );
                Self::transition(&mut core, CircuitState::Open);
                self.arm_recovery(&mut core);
            }
            CircuitState::Open => {
                // Callers are expected to skip the call while open.
                debug!(service = %self.service_name, "Failure recorded while circuit open");
            }
        }
    }

    /// Force the circuit closed and zero its counters.
    ///
    /// Cancels any pending recovery timer.
    pub fn reset(&self) {
        let mut core = self.lock();
        Self::cancel_recovery(&mut core);
        core.failure_count = 0;
        core.success_count = 0;
        core.last_failure = None;
        Self::transition(&mut core, CircuitState::Closed);
        info!(service = %self.service_name, "Circuit breaker reset");
    }

    /// Cancel a pending recovery timer without changing state.
    pub(crate) fn cancel_pending(&self) {
        Self::cancel_recovery(&mut self.lock());
    }

    /// Get circuit breaker statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut core = self.lock();
        self.promote_if_due(&mut core);
        CircuitBreakerStats {
            service_name: self.service_name.clone(),
            state: core.state,
            failure_count: core.failure_count,
            failure_threshold: self.config.failure_threshold,
            success_count: core.success_count,
            last_failure_time: core.last_failure,
            last_transition: core.last_transition,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(core: &mut BreakerCore, new_state: CircuitState) {
        core.state = new_state;
        core.last_transition = Utc::now();
    }

    fn cancel_recovery(core: &mut BreakerCore) {
        core.generation += 1;
        core.half_open_due = None;
        if let Some(timer) = core.recovery_timer.take() {
            timer.abort();
        }
    }

    /// Schedule the one-shot Open → Half-Open transition.
    fn arm_recovery(&self, core: &mut BreakerCore) {
        Self::cancel_recovery(core);

        let timeout = self.config.recovery_timeout;
        let generation = core.generation;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared: Weak<Mutex<BreakerCore>> = Arc::downgrade(&self.core);
                let service = self.service_name.clone();
                core.recovery_timer = Some(runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    let mut core = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if core.generation != generation {
                        return;
                    }
                    core.recovery_timer = None;
                    if core.state == CircuitState::Open {
                        info!(service = %service, "Circuit breaker half-open after recovery timeout");
                        Self::transition(&mut core, CircuitState::HalfOpen);
                    }
                }));
            }
            Err(_) => {
                debug!(
                    service = %self.service_name,
                    "No async runtime; half-open transition applied on next read"
                );
                core.half_open_due = Some(Instant::now() + timeout);
            }
        }
    }

    fn promote_if_due(&self, core: &mut BreakerCore) {
        if core.state != CircuitState::Open {
            return;
        }
        if let Some(due) = core.half_open_due {
            if Instant::now() >= due {
                core.half_open_due = None;
                info!(
                    service = %self.service_name,
                    "Circuit breaker half-open after recovery timeout"
                );
                Self::transition(core, CircuitState::HalfOpen);
            }
        }
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        Self::cancel_recovery(&mut self.lock());
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service_name", &self.service_name)
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Statistics for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Service name.
    pub service_name: String,

    /// Current state.
    pub state: CircuitState,

    /// Consecutive failures since the last success.
    pub failure_count: u32,

    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Successes recorded since creation or last reset.
    pub success_count: u64,

    /// Time of the most recent failure.
    pub last_failure_time: Option<DateTime<Utc>>,

    /// Time of last state transition.
    pub last_transition: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(100),
        }
    }

    async fn wait_past(duration: Duration) {
        tokio::time::sleep(duration + Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = CircuitBreaker::new("datastore", test_config());

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        assert!(breaker.stats().last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_success_resets_failures() {
        let breaker = CircuitBreaker::new("datastore", test_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_moves_open_to_half_open() {
        let breaker = CircuitBreaker::new("datastore", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        wait_past(Duration::from_millis(50)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        wait_past(Duration::from_millis(50)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breaker = CircuitBreaker::new("datastore", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        wait_past(test_config().recovery_timeout).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_rearms() {
        let breaker = CircuitBreaker::new("datastore", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        wait_past(test_config().recovery_timeout).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        wait_past(test_config().recovery_timeout).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_timer() {
        let breaker = CircuitBreaker::new("datastore", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        // A stale timer must not flip the reset breaker.
        wait_past(test_config().recovery_timeout).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_without_runtime_promotes_on_read() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(5),
        };
        let breaker = CircuitBreaker::new("datastore", config);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    proptest::proptest! {
        #[test]
        fn prop_opens_exactly_at_threshold(threshold in 1u32..10, failures in 0u32..20) {
            let breaker = CircuitBreaker::new(
                "datastore",
                CircuitBreakerConfig {
                    failure_threshold: threshold,
                    recovery_timeout: Duration::from_secs(60),
                },
            );
            for _ in 0..failures {
                breaker.record_failure();
            }
            let expected = if failures >= threshold {
                CircuitState::Open
            } else {
                CircuitState::Closed
            };
            proptest::prop_assert_eq!(breaker.state(), expected);
        }
    }
}
