//! External API reachability probe.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::{Probe, ProbeOutcome};
use crate::assessment::{ProbeResult, ProbeStatus, Subsystem};
use crate::config::ApiEndpoint;
use crate::error::{HealthError, HealthResult};
use crate::resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};

/// Issues lightweight existence checks against external endpoints.
#[async_trait]
pub trait EndpointChecker: Send + Sync {
    /// Send a HEAD-style request and return the response status code.
    async fn head(&self, endpoint: &ApiEndpoint) -> HealthResult<u16>;
}

/// [`EndpointChecker`] backed by `reqwest`.
pub struct HttpEndpointChecker {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpEndpointChecker {
    /// Create a checker for absolute endpoint URLs.
    pub fn new() -> HealthResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HealthError::Configuration(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Resolve relative endpoint URLs against `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if url.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), url)
            }
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl EndpointChecker for HttpEndpointChecker {
    async fn head(&self, endpoint: &ApiEndpoint) -> HealthResult<u16> {
        let response = self
            .client
            .head(self.resolve(&endpoint.url))
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(endpoint.timeout)
            .send()
            .await
            .map_err(|e| HealthError::Endpoint {
                endpoint: endpoint.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(response.status().as_u16())
    }
}

/// Per-endpoint result reported in the probe detail.
#[derive(Debug, Clone, Serialize)]
struct EndpointReport {
    name: String,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    use_fallback: bool,
    timeout: bool,
}

impl EndpointReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            healthy: false,
            status: None,
            response_time_ms: None,
            error: None,
            use_fallback: false,
            timeout: false,
        }
    }
}

/// Probe checking a fixed set of external endpoints, each behind its own breaker.
pub struct ApiProbe {
    endpoints: Vec<(ApiEndpoint, Arc<CircuitBreaker>)>,
    checker: Arc<dyn EndpointChecker>,
}

impl ApiProbe {
    /// Create an API probe; breakers are taken from `registry`.
    pub fn new(
        endpoints: Vec<ApiEndpoint>,
        checker: Arc<dyn EndpointChecker>,
        registry: &CircuitBreakerRegistry,
    ) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| {
                let breaker = registry.get(&endpoint.breaker_name());
                (endpoint, breaker)
            })
            .collect();
        Self { endpoints, checker }
    }

    async fn check_endpoint(
        &self,
        endpoint: &ApiEndpoint,
        breaker: &CircuitBreaker,
    ) -> EndpointReport {
        let mut report = EndpointReport::new(&endpoint.name);

        if breaker.state() == CircuitState::Open {
            debug!(endpoint = %endpoint.name, "Circuit open, skipping endpoint");
            report.use_fallback = true;
            report.error = Some("Circuit breaker open".to_string());
            return report;
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(endpoint.timeout, self.checker.head(endpoint)).await;
        report.response_time_ms = Some(start.elapsed().as_millis() as u64);

        match outcome {
            Ok(Ok(status)) if (200..300).contains(&status) => {
                breaker.record_success();
                report.healthy = true;
                report.status = Some(status);
            }
            Ok(Ok(status)) => {
                breaker.record_failure();
                report.status = Some(status);
                report.error = Some("Non-OK response".to_string());
            }
            Ok(Err(e)) => {
                breaker.record_failure();
                report.error = Some(e.to_string());
            }
            Err(_) => {
                breaker.record_failure();
                report.timeout = true;
                report.error = Some("Timeout".to_string());
            }
        }

        report
    }
}

#[async_trait]
impl Probe for ApiProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Apis
    }

    #[instrument(skip(self), fields(probe = "apis", endpoints = self.endpoints.len()))]
    async fn execute(&self) -> ProbeOutcome {
        let reports = join_all(
            self.endpoints
                .iter()
                .map(|(endpoint, breaker)| self.check_endpoint(endpoint, breaker)),
        )
        .await;

        let total = reports.len();
        let healthy = reports.iter().filter(|r| r.healthy).count();
        let status = if healthy == total {
            ProbeStatus::Healthy
        } else if healthy > 0 {
            ProbeStatus::Degraded
        } else {
            ProbeStatus::Critical
        };

        let mut result = ProbeResult::new(Subsystem::Apis, status).with_detail(json!({
            "healthy_count": healthy,
            "total_count": total,
            "details": reports,
        }));
        result.response_time_ms = reports.iter().filter_map(|r| r.response_time_ms).max();
        if total > 0 && reports.iter().all(|r| r.use_fallback) {
            result.use_fallback = true;
        }
        Ok(result)
    }
}
