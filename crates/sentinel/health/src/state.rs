//! Process-wide service state.
//!
//! Holds the activation flags, the last captured error, the set of in-flight
//! operation names used for mutual exclusion, and the rate-limit counters of
//! the health check gate. One instance is owned by the composition root and
//! shared by reference.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CheckConfig;
use crate::resilience::{CircuitBreakerRegistry, CircuitBreakerStats};

#[derive(Debug)]
struct CheckCounters {
    count: u32,
    last_check: Option<Instant>,
}

/// Decision of the health check gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAdmission {
    /// The cycle may run; `sequence` is its 1-based number since the last reset.
    Admitted { sequence: u32 },
    /// The service is deactivated.
    Inactive,
    /// The check limit has been reached.
    Limited,
    /// The previous cycle ran too recently.
    CoolingDown { remaining: Duration },
}

/// Shared service state.
pub struct ServiceStateManager {
    is_active: AtomicBool,
    is_initialized: AtomicBool,
    last_error: Mutex<Option<String>>,
    active_operations: DashMap<String, u64>,
    next_claim: AtomicU64,
    counters: Mutex<CheckCounters>,
    checks: CheckConfig,
    registry: Arc<CircuitBreakerRegistry>,
}

impl ServiceStateManager {
    /// Create an active, not yet initialized service state.
    pub fn new(checks: CheckConfig, registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            is_active: AtomicBool::new(true),
            is_initialized: AtomicBool::new(false),
            last_error: Mutex::new(None),
            active_operations: DashMap::new(),
            next_claim: AtomicU64::new(1),
            counters: Mutex::new(CheckCounters {
                count: 0,
                last_check: None,
            }),
            checks,
            registry,
        }
    }

    /// Enable health checks.
    pub fn activate(&self) {
        self.is_active.store(true, Ordering::SeqCst);
        self.is_initialized.store(true, Ordering::SeqCst);
        info!("Resilience service activated");
    }

    /// Disable health checks and release all in-flight bookkeeping.
    pub fn deactivate(&self) {
        let mut counters = self.counters();
        self.is_active.store(false, Ordering::SeqCst);
        counters.count = 0;
        self.active_operations.clear();
        info!("Resilience service deactivated");
    }

    /// Operator override: clear the check limit and cooldown.
    pub fn reset_health_check_limit(&self) {
        let mut counters = self.counters();
        counters.count = 0;
        counters.last_check = None;
        info!("Health check limit reset");
    }

    /// Whether health checks run at all.
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Whether the service has been activated at least once.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized.load(Ordering::SeqCst)
    }

    /// Number of executed cycles since the last reset.
    pub fn health_check_count(&self) -> u32 {
        self.counters().count
    }

    /// Evaluate the check gate and, if admitted, record the new cycle.
    ///
    /// Gate evaluation and counter update happen under one lock, so two
    /// concurrent callers can never both be admitted inside a cooldown.
    pub fn try_admit_check(&self) -> CheckAdmission {
        let mut counters = self.counters();

        if !self.is_active() {
            return CheckAdmission::Inactive;
        }
        if counters.count >= self.checks.max_checks {
            return CheckAdmission::Limited;
        }

        let now = Instant::now();
        if let Some(last) = counters.last_check {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.checks.cooldown {
                return CheckAdmission::CoolingDown {
                    remaining: self.checks.cooldown - elapsed,
                };
            }
        }

        counters.count += 1;
        counters.last_check = Some(now);
        CheckAdmission::Admitted {
            sequence: counters.count,
        }
    }

    /// Overwrite the last captured error.
    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Last captured error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically claim an operation name.
    ///
    /// Returns `None` when the operation is already in flight. The name is
    /// released when the returned guard drops, on every exit path. A guard
    /// only releases its own claim, so a guard outliving `deactivate()` never
    /// frees a newer claim of the same name.
    pub fn try_begin(&self, operation: &str) -> Option<OperationGuard<'_>> {
        match self.active_operations.entry(operation.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);
                slot.insert(claim);
                debug!(operation = %operation, claim, "Operation started");
                Some(OperationGuard {
                    state: self,
                    operation: operation.to_string(),
                    claim,
                })
            }
        }
    }

    /// Whether an operation is in flight.
    pub fn is_operation_active(&self, operation: &str) -> bool {
        self.active_operations.contains_key(operation)
    }

    /// Read-only diagnostics snapshot.
    pub fn status(&self) -> ServiceStatus {
        let (count, last_check) = {
            let counters = self.counters();
            (counters.count, counters.last_check)
        };
        let mut active_operations: Vec<String> =
            self.active_operations.iter().map(|op| op.key().clone()).collect();
        active_operations.sort();

        ServiceStatus {
            is_active: self.is_active(),
            is_initialized: self.is_initialized(),
            health_check_count: count,
            max_health_checks: self.checks.max_checks,
            cooldown_ms: self.checks.cooldown.as_millis() as u64,
            ms_since_last_check: last_check.map(|t| t.elapsed().as_millis() as u64),
            active_operations,
            last_error: self.last_error(),
            circuit_breakers: self.registry.names(),
            breaker_stats: self.registry.stats(),
        }
    }

    fn counters(&self) -> MutexGuard<'_, CheckCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases an operation name when dropped.
#[must_use = "the operation is released as soon as the guard is dropped"]
pub struct OperationGuard<'a> {
    state: &'a ServiceStateManager,
    operation: String,
    claim: u64,
}

impl OperationGuard<'_> {
    /// Claimed operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let released = self
            .state
            .active_operations
            .remove_if(&self.operation, |_, claim| *claim == self.claim)
            .is_some();
        debug!(operation = %self.operation, released, "Operation released");
    }
}

/// Diagnostics snapshot of the service state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Whether health checks run.
    pub is_active: bool,
    /// Whether the service has ever been activated.
    pub is_initialized: bool,
    /// Executed cycles since the last reset.
    pub health_check_count: u32,
    /// Configured check limit.
    pub max_health_checks: u32,
    /// Configured minimum spacing between cycles.
    pub cooldown_ms: u64,
    /// Time since the last admitted cycle, if any.
    pub ms_since_last_check: Option<u64>,
    /// In-flight operation names, sorted.
    pub active_operations: Vec<String>,
    /// Last captured error message.
    pub last_error: Option<String>,
    /// Registered breaker names, sorted.
    pub circuit_breakers: Vec<String>,
    /// Per-breaker diagnostics.
    pub breaker_stats: Vec<CircuitBreakerStats>,
}
