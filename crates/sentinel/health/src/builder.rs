//! Builder for the resilience core.
//!
//! Wires the breaker registry, service state, probes, healing controller and
//! orchestrator from one configuration and a set of outbound transports.

use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::error::{HealthError, HealthResult};
use crate::orchestrator::HealthCheckOrchestrator;
use crate::probes::{
    ApiProbe, DataStore, DatabaseProbe, EndpointChecker, HttpEndpointChecker, LatencySampler,
    MemoryGauge, MemoryProbe, PerformanceProbe, ProbeSet, ProcMemoryGauge, RuntimeLatencySampler,
};
use crate::resilience::{AutoHealingController, CircuitBreakerRegistry, MemoryReclaimer};
use crate::state::ServiceStateManager;

/// Builder for constructing a [`HealthCheckOrchestrator`] with all dependencies
pub struct ResilienceCoreBuilder {
    config: ResilienceConfig,
    data_store: Option<Arc<dyn DataStore>>,
    endpoint_checker: Option<Arc<dyn EndpointChecker>>,
    memory_gauge: Option<Arc<dyn MemoryGauge>>,
    latency_sampler: Option<Arc<dyn LatencySampler>>,
    memory_reclaimer: Option<Arc<dyn MemoryReclaimer>>,
}

impl Default for ResilienceCoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceCoreBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
            data_store: None,
            endpoint_checker: None,
            memory_gauge: None,
            latency_sampler: None,
            memory_reclaimer: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data store probed by the database probe
    pub fn with_data_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    /// Set the endpoint checker used by the API probe
    pub fn with_endpoint_checker(mut self, checker: Arc<dyn EndpointChecker>) -> Self {
        self.endpoint_checker = Some(checker);
        self
    }

    /// Set the memory gauge
    pub fn with_memory_gauge(mut self, gauge: Arc<dyn MemoryGauge>) -> Self {
        self.memory_gauge = Some(gauge);
        self
    }

    /// Set the latency sampler
    pub fn with_latency_sampler(mut self, sampler: Arc<dyn LatencySampler>) -> Self {
        self.latency_sampler = Some(sampler);
        self
    }

    /// Set the memory reclamation hook used by auto-healing
    pub fn with_memory_reclaimer(mut self, reclaimer: Arc<dyn MemoryReclaimer>) -> Self {
        self.memory_reclaimer = Some(reclaimer);
        self
    }

    /// Build the orchestrator with all components
    pub fn build(self) -> HealthResult<HealthCheckOrchestrator> {
        self.config.validate()?;

        let data_store = self
            .data_store
            .ok_or_else(|| HealthError::Configuration("data_store required".into()))?;
        let endpoint_checker = match self.endpoint_checker {
            Some(checker) => checker,
            None => {
                // The default checker has no base URL to resolve paths against.
                if let Some(endpoint) = self
                    .config
                    .probes
                    .endpoints
                    .iter()
                    .find(|e| !e.url.contains("://"))
                {
                    return Err(HealthError::Configuration(format!(
                        "endpoint {} has relative url {}; provide an endpoint checker with a base url",
                        endpoint.name, endpoint.url
                    )));
                }
                Arc::new(HttpEndpointChecker::new()?)
            }
        };
        let memory_gauge = self
            .memory_gauge
            .unwrap_or_else(|| Arc::new(ProcMemoryGauge::default()));
        let latency_sampler = self
            .latency_sampler
            .unwrap_or_else(|| Arc::new(RuntimeLatencySampler));

        let config = self.config;
        let probe_config = &config.probes;

        let registry = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        let state = Arc::new(ServiceStateManager::new(
            config.checks.clone(),
            registry.clone(),
        ));

        let probes = ProbeSet::new(
            Arc::new(DatabaseProbe::new(
                data_store,
                registry.get(&probe_config.database_service),
                probe_config.database_timeout,
                probe_config.database_slow_threshold,
            )),
            Arc::new(ApiProbe::new(
                probe_config.endpoints.clone(),
                endpoint_checker,
                &registry,
            )),
            Arc::new(MemoryProbe::new(
                memory_gauge,
                probe_config.local_probe_timeout,
                probe_config.memory_warning_ratio,
                probe_config.memory_critical_ratio,
            )),
            Arc::new(PerformanceProbe::new(latency_sampler, probe_config)),
        );

        let mut healer = AutoHealingController::new(
            config.healing.clone(),
            state.clone(),
            registry.clone(),
            probe_config.database_service.clone(),
        );
        if let Some(reclaimer) = self.memory_reclaimer {
            healer = healer.with_reclaimer(reclaimer);
        }

        Ok(HealthCheckOrchestrator::new(
            config, state, registry, probes, healer,
        ))
    }
}
