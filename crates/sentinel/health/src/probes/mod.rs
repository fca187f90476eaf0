//! Subsystem health probes.
//!
//! Each probe checks one subsystem under its own time budget and, for remote
//! dependencies, behind its own circuit breaker:
//! - Database: one minimal read against the data store
//! - APIs: reachability of a small fixed set of endpoints
//! - Memory: runtime memory pressure
//! - Performance: render latency and scheduling responsiveness
//!
//! Probes return `Result<ProbeResult, ProbeFault>`; [`ProbeSet`] turns every
//! fault, including a panicking probe, into a reportable result.

mod apis;
mod database;
mod memory;
mod performance;

pub use apis::{ApiProbe, EndpointChecker, HttpEndpointChecker};
pub use database::{DataStore, DatabaseProbe};
pub use memory::{MemoryGauge, MemoryProbe, MemorySample, ProcMemoryGauge};
pub use performance::{LatencySampler, PerformanceProbe, RuntimeLatencySampler};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::assessment::{ProbeResult, Subsystem, SubsystemResults};
use crate::error::ProbeFault;

/// Outcome of a probe execution.
pub type ProbeOutcome = Result<ProbeResult, ProbeFault>;

/// Trait for subsystem probes.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Subsystem this probe checks.
    fn subsystem(&self) -> Subsystem;

    /// Run the probe. Must resolve within the probe's own time budget.
    async fn execute(&self) -> ProbeOutcome;

    /// Get the probe name for logging.
    fn name(&self) -> &str {
        self.subsystem().as_str()
    }
}

/// The four probes run on every check cycle.
#[derive(Clone)]
pub struct ProbeSet {
    database: Arc<dyn Probe>,
    apis: Arc<dyn Probe>,
    memory: Arc<dyn Probe>,
    performance: Arc<dyn Probe>,
}

impl ProbeSet {
    /// Create a probe set from one probe per subsystem.
    pub fn new(
        database: Arc<dyn Probe>,
        apis: Arc<dyn Probe>,
        memory: Arc<dyn Probe>,
        performance: Arc<dyn Probe>,
    ) -> Self {
        Self {
            database,
            apis,
            memory,
            performance,
        }
    }

    /// Probe assigned to a subsystem.
    pub fn probe(&self, subsystem: Subsystem) -> &Arc<dyn Probe> {
        match subsystem {
            Subsystem::Database => &self.database,
            Subsystem::Apis => &self.apis,
            Subsystem::Memory => &self.memory,
            Subsystem::Performance => &self.performance,
        }
    }

    /// Run every probe concurrently and wait for all of them to settle.
    ///
    /// A failed, slow or panicking probe never cancels its siblings.
    pub async fn execute_all(&self) -> SubsystemResults {
        let [database, apis, memory, performance] = Subsystem::ALL.map(|subsystem| {
            let probe = self.probe(subsystem).clone();
            tokio::spawn(async move { probe.execute().await })
        });

        let (database, apis, memory, performance) =
            tokio::join!(database, apis, memory, performance);

        SubsystemResults {
            database: settle(Subsystem::Database, database),
            apis: settle(Subsystem::Apis, apis),
            memory: settle(Subsystem::Memory, memory),
            performance: settle(Subsystem::Performance, performance),
        }
    }
}

fn settle(
    subsystem: Subsystem,
    joined: Result<ProbeOutcome, tokio::task::JoinError>,
) -> ProbeResult {
    let fault = match joined {
        Ok(Ok(mut result)) => {
            result.subsystem = subsystem;
            return result;
        }
        Ok(Err(fault)) => fault,
        Err(join_error) => ProbeFault::Panicked {
            subsystem,
            reason: join_error.to_string(),
        },
    };

    warn!(probe = %subsystem, error = %fault, "Probe fault");
    let mut result = ProbeResult::from_fault(&fault);
    result.subsystem = subsystem;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::ProbeStatus;

    struct FixedProbe(Subsystem, ProbeStatus);

    #[async_trait]
    impl Probe for FixedProbe {
        fn subsystem(&self) -> Subsystem {
            self.0
        }

        async fn execute(&self) -> ProbeOutcome {
            Ok(ProbeResult::new(self.0, self.1))
        }
    }

    struct PanickingProbe;

    #[async_trait]
    impl Probe for PanickingProbe {
        fn subsystem(&self) -> Subsystem {
            Subsystem::Memory
        }

        async fn execute(&self) -> ProbeOutcome {
            panic!("counter read exploded")
        }
    }

    struct FaultyProbe;

    #[async_trait]
    impl Probe for FaultyProbe {
        fn subsystem(&self) -> Subsystem {
            Subsystem::Performance
        }

        async fn execute(&self) -> ProbeOutcome {
            Err(ProbeFault::Indeterminate {
                subsystem: Subsystem::Performance,
                reason: "no clock".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_faults_become_results() {
        let set = ProbeSet::new(
            Arc::new(FixedProbe(Subsystem::Database, ProbeStatus::Healthy)),
            Arc::new(FixedProbe(Subsystem::Apis, ProbeStatus::Degraded)),
            Arc::new(PanickingProbe),
            Arc::new(FaultyProbe),
        );

        let results = set.execute_all().await;

        assert_eq!(results.database.status, ProbeStatus::Healthy);
        assert_eq!(results.apis.status, ProbeStatus::Degraded);
        assert_eq!(results.memory.status, ProbeStatus::Critical);
        assert_eq!(results.memory.subsystem, Subsystem::Memory);
        assert_eq!(results.performance.status, ProbeStatus::Unknown);
    }
}
