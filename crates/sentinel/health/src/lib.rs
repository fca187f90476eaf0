//! # Sentinel Health - Resilience Core for Dashboard Backends
//!
//! This crate protects a client that depends on a data store and a handful of
//! external APIs. It wraps each dependent service in a circuit breaker, runs
//! rate-limited multi-subsystem health checks, folds the results into a single
//! resilience score, and triggers bounded, mutually exclusive auto-healing.
//!
//! ## Key Components
//!
//! - [`HealthCheckOrchestrator`]: gated, parallel check cycles
//! - [`HealthCheckSnapshot`]: immutable, scored result of one cycle
//! - [`probes`]: database, API, memory and performance probes
//! - [`resilience`]: circuit breakers, their registry and auto-healing
//! - [`ServiceStateManager`]: activation flags, last error and in-flight operations
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use sentinel_health::probes::{DataStore, HttpEndpointChecker};
//! use sentinel_health::{HealthResult, ResilienceCoreBuilder};
//!
//! struct Profiles;
//!
//! #[async_trait]
//! impl DataStore for Profiles {
//!     fn name(&self) -> &str {
//!         "profiles"
//!     }
//!
//!     async fn minimal_read(&self) -> HealthResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> HealthResult<()> {
//! let checker = HttpEndpointChecker::new()?.with_base_url("http://localhost:8080");
//! let core = ResilienceCoreBuilder::new()
//!     .with_data_store(Arc::new(Profiles))
//!     .with_endpoint_checker(Arc::new(checker))
//!     .build()?;
//!
//! if let Some(snapshot) = core.run_check().await {
//!     println!("Resilience score: {}", snapshot.resilience_score);
//! }
//!
//! core.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Check Gate
//!
//! A cycle runs only when the service is active, fewer than the configured
//! number of cycles have executed since the last reset, and the cooldown has
//! elapsed. Past the limit a fixed "limited" snapshot is returned until an
//! operator calls [`HealthCheckOrchestrator::reset_health_check_limit`].
//!
//! ## Resilience Patterns
//!
//! - **Circuit Breaker**: stops calling a failing service until a timed trial
//! - **Fallback**: open breakers short-circuit probes to a degraded result
//! - **Auto-Healing**: resets breakers and reclaims memory, one batch at a time

pub mod assessment;
pub mod builder;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod probes;
pub mod resilience;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types
pub use assessment::{
    resilience_score, HealthCheckSnapshot, ProbeResult, ProbeStatus, ResilienceMode,
    SnapshotStatus, Subsystem, SubsystemResults,
};
pub use builder::ResilienceCoreBuilder;
pub use config::{
    ApiEndpoint, CheckConfig, CircuitBreakerConfig, Deduction, HealingConfig, ProbeConfig,
    ResilienceConfig, ScorePolicy,
};
pub use error::{HealthError, HealthResult, ProbeFault};
pub use orchestrator::{HealthCheckOrchestrator, HealthEvent};
pub use probes::{Probe, ProbeOutcome, ProbeSet};
pub use resilience::{
    AutoHealingController, CircuitBreaker, CircuitBreakerRegistry, CircuitState, HealingAction,
    HealingOutcome, HealingReport,
};
pub use state::{CheckAdmission, ServiceStateManager, ServiceStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDataStore, FakeEndpointChecker, FixedLatencySampler, FixedMemoryGauge};
    use std::sync::Arc;

    fn builder() -> ResilienceCoreBuilder {
        ResilienceCoreBuilder::new()
            .with_endpoint_checker(Arc::new(FakeEndpointChecker::new(200)))
            .with_memory_gauge(Arc::new(FixedMemoryGauge::unavailable()))
            .with_latency_sampler(Arc::new(FixedLatencySampler::default()))
    }

    #[test]
    fn test_build_requires_data_store() {
        assert!(matches!(
            builder().build(),
            Err(HealthError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = ResilienceConfig::default();
        config.checks.max_checks = 0;
        let result = builder()
            .with_config(config)
            .with_data_store(Arc::new(FakeDataStore::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_checker_rejects_relative_endpoints() {
        let err = ResilienceCoreBuilder::new()
            .with_data_store(Arc::new(FakeDataStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, HealthError::Configuration(ref msg) if msg.contains("/api/health")));

        let mut config = ResilienceConfig::default();
        config.probes.endpoints[0].url = "https://status.example.test/health".to_string();
        let core = ResilienceCoreBuilder::new()
            .with_config(config)
            .with_data_store(Arc::new(FakeDataStore::new()))
            .with_memory_gauge(Arc::new(FixedMemoryGauge::unavailable()))
            .build();
        assert!(core.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_built_core_runs_a_cycle() {
        let core = builder()
            .with_data_store(Arc::new(FakeDataStore::new()))
            .build()
            .unwrap();

        let snapshot = core.run_check().await.unwrap();
        assert_eq!(snapshot.resilience_score, 85);
        assert_eq!(core.registry().names(), vec!["api.health", "datastore"]);
        core.shutdown();
    }
}
