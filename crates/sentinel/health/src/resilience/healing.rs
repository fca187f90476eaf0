//! Auto-healing controller.
//!
//! Runs a bounded batch of remediation actions for the subsystems a check
//! cycle found critical. Only one batch is ever in flight; the batch is
//! advisory and never fails its caller.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::recovery::{HealingAction, HealingOutcome, HealingReport};
use super::registry::CircuitBreakerRegistry;
use crate::assessment::HealthCheckSnapshot;
use crate::config::HealingConfig;
use crate::error::{HealthError, HealthResult};
use crate::state::ServiceStateManager;

/// Operation name claimed while a healing batch runs.
pub const AUTO_HEALING_OPERATION: &str = "autoHealing";

/// Best-effort hook asking the runtime to release memory.
pub trait MemoryReclaimer: Send + Sync {
    /// Release what can be released. May block.
    fn reclaim(&self) -> HealthResult<()>;
}

/// Executes remediation batches with mutual exclusion and a batch timeout.
pub struct AutoHealingController {
    config: HealingConfig,
    state: Arc<ServiceStateManager>,
    registry: Arc<CircuitBreakerRegistry>,
    reclaimer: Option<Arc<dyn MemoryReclaimer>>,
    database_service: String,
}

impl AutoHealingController {
    /// Create a healing controller.
    pub fn new(
        config: HealingConfig,
        state: Arc<ServiceStateManager>,
        registry: Arc<CircuitBreakerRegistry>,
        database_service: impl Into<String>,
    ) -> Self {
        Self {
            config,
            state,
            registry,
            reclaimer: None,
            database_service: database_service.into(),
        }
    }

    /// Install the memory reclamation hook.
    pub fn with_reclaimer(mut self, reclaimer: Arc<dyn MemoryReclaimer>) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    /// Whether healing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Actions the controller would run for a snapshot.
    pub fn select_actions(&self, snapshot: &HealthCheckSnapshot) -> Vec<HealingAction> {
        let Some(results) = &snapshot.probe_results else {
            return Vec::new();
        };
        results
            .critical()
            .into_iter()
            .filter_map(|subsystem| HealingAction::for_subsystem(subsystem, &self.database_service))
            .take(self.config.max_actions)
            .collect()
    }

    /// Run one healing batch for `snapshot`.
    ///
    /// Returns `None` when healing is disabled or another batch is already
    /// in flight. Action failures and a batch timeout are recorded as the
    /// service's last error; actions still running at the timeout are left
    /// to finish in the background.
    #[instrument(skip(self, snapshot), fields(check_id = %snapshot.check_id))]
    pub async fn heal(&self, snapshot: &HealthCheckSnapshot) -> Option<HealingReport> {
        if !self.config.enabled {
            debug!("Auto-healing disabled");
            return None;
        }

        let Some(_guard) = self.state.try_begin(AUTO_HEALING_OPERATION) else {
            debug!("Auto-healing already in progress");
            return None;
        };

        let started_at = Utc::now();
        let actions = self.select_actions(snapshot);
        info!(actions = actions.len(), "Auto-healing started");

        let mut pending: FuturesUnordered<_> = actions
            .iter()
            .cloned()
            .map(|action| {
                let handle = tokio::spawn(self.run_action(action.clone()));
                handle.map(move |joined| (action, joined))
            })
            .collect();

        let deadline = Instant::now() + self.config.batch_timeout;
        let mut outcomes = Vec::with_capacity(actions.len());
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((_, Ok(outcome)))) => outcomes.push(outcome),
                Ok(Some((action, Err(join_error)))) => {
                    outcomes.push(HealingOutcome::failure(action, 0, join_error.to_string()));
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        for outcome in outcomes.iter().filter(|o| !o.success) {
            let error = HealthError::RemediationFailed {
                action: outcome.action.to_string(),
                reason: outcome.error.clone().unwrap_or_default(),
            };
            warn!(error = %error, "Healing action failed");
            self.state.record_error(error.to_string());
        }

        if timed_out {
            let error = HealthError::HealingTimeout {
                timeout_ms: self.config.batch_timeout.as_millis() as u64,
            };
            warn!(
                pending = pending.len(),
                error = %error,
                "Auto-healing batch timed out"
            );
            self.state.record_error(error.to_string());
        }

        let report = HealingReport {
            check_id: snapshot.check_id,
            actions,
            outcomes,
            timed_out,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            succeeded = report.succeeded(),
            timed_out = report.timed_out,
            "Auto-healing completed"
        );
        Some(report)
    }

    fn run_action(
        &self,
        action: HealingAction,
    ) -> impl std::future::Future<Output = HealingOutcome> + Send + 'static {
        let registry = self.registry.clone();
        let reclaimer = self.reclaimer.clone();

        async move {
            let start = Instant::now();
            let result = match &action {
                HealingAction::ResetBreaker { service } => {
                    registry.get(service).reset();
                    Ok(())
                }
                HealingAction::ReclaimMemory => match reclaimer {
                    Some(reclaimer) => tokio::task::spawn_blocking(move || reclaimer.reclaim())
                        .await
                        .unwrap_or_else(|e| Err(HealthError::Internal(e.to_string()))),
                    None => {
                        debug!("No memory reclamation hook installed");
                        Ok(())
                    }
                },
            };

            let duration_ms = start.elapsed().as_millis() as u64;
            match result {
                Ok(()) => HealingOutcome::success(action, duration_ms),
                Err(e) => HealingOutcome::failure(action, duration_ms, e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{ProbeResult, ProbeStatus, Subsystem, SubsystemResults};
    use crate::config::{CheckConfig, CircuitBreakerConfig, ScorePolicy};
    use crate::resilience::CircuitState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct SlowReclaimer {
        delay: Duration,
        calls: AtomicU32,
    }

    impl MemoryReclaimer for SlowReclaimer {
        fn reclaim(&self) -> HealthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    struct FailingReclaimer;

    impl MemoryReclaimer for FailingReclaimer {
        fn reclaim(&self) -> HealthResult<()> {
            Err(HealthError::Internal("no gc hook".into()))
        }
    }

    fn snapshot(database: ProbeStatus, memory: ProbeStatus) -> HealthCheckSnapshot {
        let results = SubsystemResults {
            database: ProbeResult::new(Subsystem::Database, database),
            apis: ProbeResult::new(Subsystem::Apis, ProbeStatus::Critical),
            memory: ProbeResult::new(Subsystem::Memory, memory),
            performance: ProbeResult::new(Subsystem::Performance, ProbeStatus::Healthy),
        };
        HealthCheckSnapshot::complete(results, &ScorePolicy::default())
    }

    fn controller(config: HealingConfig) -> (AutoHealingController, Arc<ServiceStateManager>, Arc<CircuitBreakerRegistry>) {
        let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
        let state = Arc::new(ServiceStateManager::new(CheckConfig::default(), registry.clone()));
        let controller =
            AutoHealingController::new(config, state.clone(), registry.clone(), "datastore");
        (controller, state, registry)
    }

    #[tokio::test]
    async fn test_database_remediation_closes_breaker() {
        let (controller, state, registry) = controller(HealingConfig::default());
        let breaker = registry.get("datastore");
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let report = controller
            .heal(&snapshot(ProbeStatus::Critical, ProbeStatus::Healthy))
            .await
            .unwrap();

        assert_eq!(
            report.actions,
            vec![HealingAction::ResetBreaker {
                service: "datastore".into()
            }]
        );
        assert_eq!(report.succeeded(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!state.is_operation_active(AUTO_HEALING_OPERATION));
    }

    #[tokio::test]
    async fn test_apis_have_no_remediation() {
        let (controller, _, _) = controller(HealingConfig::default());
        let actions = controller.select_actions(&snapshot(ProbeStatus::Healthy, ProbeStatus::Healthy));
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_heal_runs_one_batch() {
        let (controller, state, _) = controller(HealingConfig::default());
        let reclaimer = Arc::new(SlowReclaimer {
            delay: Duration::from_millis(50),
            calls: AtomicU32::new(0),
        });
        let controller = controller.with_reclaimer(reclaimer.clone());
        let snapshot = snapshot(ProbeStatus::Healthy, ProbeStatus::Critical);

        let (first, second) = tokio::join!(controller.heal(&snapshot), controller.heal(&snapshot));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(reclaimer.calls.load(Ordering::SeqCst), 1);
        assert!(!state.is_operation_active(AUTO_HEALING_OPERATION));
    }

    #[tokio::test]
    async fn test_batch_timeout_releases_operation() {
        let config = HealingConfig {
            batch_timeout: Duration::from_millis(20),
            ..HealingConfig::default()
        };
        let (controller, state, _) = controller(config);
        let controller = controller.with_reclaimer(Arc::new(SlowReclaimer {
            delay: Duration::from_millis(300),
            calls: AtomicU32::new(0),
        }));

        let report = controller
            .heal(&snapshot(ProbeStatus::Critical, ProbeStatus::Critical))
            .await
            .unwrap();

        assert!(report.timed_out);
        assert_eq!(report.actions.len(), 2);
        assert!(state.last_error().unwrap().contains("timed out"));
        assert!(!state.is_operation_active(AUTO_HEALING_OPERATION));
    }

    #[tokio::test]
    async fn test_failed_action_is_recorded_not_raised() {
        let (controller, state, _) = controller(HealingConfig::default());
        let controller = controller.with_reclaimer(Arc::new(FailingReclaimer));

        let report = controller
            .heal(&snapshot(ProbeStatus::Healthy, ProbeStatus::Critical))
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 0);
        assert!(state.last_error().unwrap().contains("no gc hook"));
    }

    #[tokio::test]
    async fn test_disabled_healing_does_nothing() {
        let config = HealingConfig {
            enabled: false,
            ..HealingConfig::default()
        };
        let (controller, _, _) = controller(config);
        assert!(controller
            .heal(&snapshot(ProbeStatus::Critical, ProbeStatus::Healthy))
            .await
            .is_none());
    }
}
