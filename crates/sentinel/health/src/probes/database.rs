//! Data store reachability probe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::{Probe, ProbeOutcome};
use crate::assessment::{ProbeResult, ProbeStatus, Subsystem};
use crate::error::{HealthResult, ProbeFault};
use crate::resilience::{CircuitBreaker, CircuitState};

/// The data store the dashboard reads from, seen as an opaque dependency.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Store name for diagnostics.
    fn name(&self) -> &str;

    /// Issue one minimal, read-only query.
    async fn minimal_read(&self) -> HealthResult<()>;
}

/// Probe issuing a minimal read against the data store.
pub struct DatabaseProbe {
    store: Arc<dyn DataStore>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    slow_threshold: Duration,
}

impl DatabaseProbe {
    /// Create a database probe guarded by `breaker`.
    pub fn new(
        store: Arc<dyn DataStore>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            store,
            breaker,
            timeout,
            slow_threshold,
        }
    }
}

#[async_trait]
impl Probe for DatabaseProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Database
    }

    #[instrument(skip(self), fields(probe = "database", store = %self.store.name()))]
    async fn execute(&self) -> ProbeOutcome {
        if self.breaker.state() == CircuitState::Open {
            debug!("Circuit open, skipping data store read");
            return Ok(ProbeResult::fallback(
                Subsystem::Database,
                "Circuit breaker open - serving fallback",
            ));
        }

        let start = Instant::now();
        let read = tokio::time::timeout(self.timeout, self.store.minimal_read()).await;
        let elapsed = start.elapsed();
        let response_time_ms = elapsed.as_millis() as u64;

        match read {
            Ok(Ok(())) if elapsed > self.slow_threshold => {
                self.breaker.record_failure();
                Ok(ProbeResult::new(Subsystem::Database, ProbeStatus::Critical)
                    .with_response_time(response_time_ms)
                    .with_detail(json!({
                        "store": self.store.name(),
                        "error": format!(
                            "read took {}ms, above {}ms",
                            response_time_ms,
                            self.slow_threshold.as_millis()
                        ),
                    })))
            }
            Ok(Ok(())) => {
                self.breaker.record_success();
                Ok(ProbeResult::new(Subsystem::Database, ProbeStatus::Healthy)
                    .with_response_time(response_time_ms)
                    .with_detail(json!({
                        "store": self.store.name(),
                        "connections": "stable",
                    })))
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                Ok(ProbeResult::new(Subsystem::Database, ProbeStatus::Critical)
                    .with_response_time(response_time_ms)
                    .with_detail(json!({
                        "store": self.store.name(),
                        "error": e.to_string(),
                    })))
            }
            Err(_) => {
                self.breaker.record_failure();
                Err(ProbeFault::Timeout {
                    subsystem: Subsystem::Database,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}
