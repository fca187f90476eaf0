//! Health check orchestrator.
//!
//! Gates each check cycle on activation, the check limit and the cooldown,
//! runs every subsystem probe concurrently, scores the settled results and
//! escalates to auto-healing when the score drops below the policy threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assessment::{HealthCheckSnapshot, ResilienceMode, Subsystem};
use crate::config::ResilienceConfig;
use crate::probes::ProbeSet;
use crate::resilience::{AutoHealingController, CircuitBreakerRegistry, HealingReport};
use crate::state::{CheckAdmission, ServiceStateManager, ServiceStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// A check was requested but not run.
    CheckSkipped {
        /// Why the check did not run.
        reason: String,
    },

    /// The check limit is engaged; a limited snapshot was returned.
    CheckLimited {
        /// Id of the limited snapshot.
        check_id: Uuid,
    },

    /// A complete snapshot was produced.
    SnapshotProduced {
        /// The produced snapshot.
        snapshot: Box<HealthCheckSnapshot>,
        /// Operating mode derived from the score.
        mode: ResilienceMode,
    },

    /// Auto-healing was started for critical subsystems.
    HealingStarted {
        /// Cycle that triggered healing.
        check_id: Uuid,
        /// Subsystems reported critical.
        critical: Vec<Subsystem>,
    },

    /// An auto-healing batch finished or timed out.
    HealingCompleted {
        /// Outcome of every action in the batch.
        report: Box<HealingReport>,
    },

    /// Auto-healing was needed but did not run.
    HealingSkipped {
        /// Cycle whose healing did not run.
        check_id: Uuid,
    },
}

/// Runs rate-limited health check cycles.
pub struct HealthCheckOrchestrator {
    /// Configuration.
    config: ResilienceConfig,

    /// Shared service state.
    state: Arc<ServiceStateManager>,

    /// Circuit breakers for every dependent service.
    registry: Arc<CircuitBreakerRegistry>,

    /// One probe per subsystem.
    probes: ProbeSet,

    /// Remediation controller.
    healer: AutoHealingController,

    /// Event broadcaster.
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthCheckOrchestrator {
    /// Create an orchestrator from its collaborators.
    pub fn new(
        config: ResilienceConfig,
        state: Arc<ServiceStateManager>,
        registry: Arc<CircuitBreakerRegistry>,
        probes: ProbeSet,
        healer: AutoHealingController,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state,
            registry,
            probes,
            healer,
            event_tx,
        }
    }

    /// Subscribe to health events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Configuration the core was built with.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Shared service state.
    pub fn state(&self) -> &Arc<ServiceStateManager> {
        &self.state
    }

    /// Circuit breaker registry.
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Run one check cycle.
    ///
    /// Returns `None` when the service is inactive or the cooldown has not
    /// elapsed, a limited snapshot once the check limit is reached, and a
    /// complete snapshot otherwise. Never fails and never panics: probe
    /// faults are folded into the snapshot and healing is advisory.
    #[instrument(skip(self))]
    pub async fn run_check(&self) -> Option<HealthCheckSnapshot> {
        match self.state.try_admit_check() {
            CheckAdmission::Admitted { sequence } => {
                debug!(sequence, "Health check admitted");
            }
            CheckAdmission::Inactive => {
                debug!("Health check skipped: service inactive");
                self.emit(HealthEvent::CheckSkipped {
                    reason: "inactive".to_string(),
                });
                return None;
            }
            CheckAdmission::Limited => {
                debug!(
                    max_checks = self.config.checks.max_checks,
                    "Health check limit reached"
                );
                let snapshot = HealthCheckSnapshot::limited(&self.config.score);
                self.emit(HealthEvent::CheckLimited {
                    check_id: snapshot.check_id,
                });
                return Some(snapshot);
            }
            CheckAdmission::CoolingDown { remaining } => {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "Health check skipped: cooldown"
                );
                self.emit(HealthEvent::CheckSkipped {
                    reason: format!("cooldown, {}ms remaining", remaining.as_millis()),
                });
                return None;
            }
        }

        let results = self.probes.execute_all().await;
        let snapshot = HealthCheckSnapshot::complete(results, &self.config.score);
        let mode = snapshot.mode(&self.config.score);

        info!(
            check_id = %snapshot.check_id,
            score = snapshot.resilience_score,
            mode = ?mode,
            "Health check completed"
        );
        self.emit(HealthEvent::SnapshotProduced {
            snapshot: Box::new(snapshot.clone()),
            mode,
        });

        if snapshot.needs_healing(&self.config.score) {
            self.escalate(&snapshot).await;
        }

        Some(snapshot)
    }

    async fn escalate(&self, snapshot: &HealthCheckSnapshot) {
        let critical = snapshot
            .probe_results
            .as_ref()
            .map(|results| results.critical())
            .unwrap_or_default();
        warn!(
            check_id = %snapshot.check_id,
            score = snapshot.resilience_score,
            threshold = self.config.score.heal_below,
            "Resilience score below healing threshold"
        );

        if self.healer.is_enabled() {
            self.emit(HealthEvent::HealingStarted {
                check_id: snapshot.check_id,
                critical,
            });
        }

        match self.healer.heal(snapshot).await {
            Some(report) => self.emit(HealthEvent::HealingCompleted {
                report: Box::new(report),
            }),
            None => self.emit(HealthEvent::HealingSkipped {
                check_id: snapshot.check_id,
            }),
        }
    }

    /// Enable health checks.
    pub fn activate(&self) {
        self.state.activate();
    }

    /// Disable health checks.
    pub fn deactivate(&self) {
        self.state.deactivate();
    }

    /// Clear the check limit and cooldown.
    pub fn reset_health_check_limit(&self) {
        self.state.reset_health_check_limit();
    }

    /// Diagnostics snapshot.
    pub fn status(&self) -> ServiceStatus {
        self.state.status()
    }

    /// Configured minimum spacing between check cycles.
    pub fn cooldown(&self) -> Duration {
        self.config.checks.cooldown
    }

    /// Cancel pending breaker timers.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        info!("Resilience core shut down");
    }

    fn emit(&self, event: HealthEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}
