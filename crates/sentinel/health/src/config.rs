//! Resilience core configuration.
//!
//! Every threshold, timeout and score weight the core uses lives here as a
//! named value. A built core treats its configuration as constant.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assessment::{ProbeStatus, Subsystem};
use crate::error::{HealthError, HealthResult};

/// Top-level configuration for the resilience core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker defaults applied to every breaker the registry creates.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health check rate limiting.
    pub checks: CheckConfig,

    /// Auto-healing behaviour.
    pub healing: HealingConfig,

    /// Resilience score policy.
    pub score: ScorePolicy,

    /// Subsystem probe settings.
    pub probes: ProbeConfig,
}

impl ResilienceConfig {
    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> HealthResult<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(HealthError::Configuration(
                "circuit breaker failure_threshold must be at least 1".into(),
            ));
        }
        if self.circuit_breaker.recovery_timeout.is_zero() {
            return Err(HealthError::Configuration(
                "circuit breaker recovery_timeout must be non-zero".into(),
            ));
        }
        if self.checks.max_checks == 0 {
            return Err(HealthError::Configuration(
                "max_checks must be at least 1".into(),
            ));
        }
        if self.healing.batch_timeout.is_zero() {
            return Err(HealthError::Configuration(
                "healing batch_timeout must be non-zero".into(),
            ));
        }
        self.score.validate()?;
        self.probes.validate()
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before moving to half-open.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Rate limiting of health check cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Minimum spacing between two executed check cycles.
    pub cooldown: Duration,

    /// Executed cycles allowed before the protective ceiling engages.
    pub max_checks: u32,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            max_checks: 5,
        }
    }
}

/// Auto-healing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Run remediation when the score drops below the healing threshold.
    pub enabled: bool,

    /// Timeout over the whole remediation batch.
    pub batch_timeout: Duration,

    /// Upper bound on remediation actions per batch.
    pub max_actions: usize,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_timeout: Duration::from_secs(10),
            max_actions: 2,
        }
    }
}

/// Deductions applied for one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    /// Points removed when the subsystem is critical.
    pub critical: u8,

    /// Points removed when the subsystem is in warning or degraded.
    pub warning: u8,
}

impl Deduction {
    /// Create a deduction pair.
    pub const fn new(critical: u8, warning: u8) -> Self {
        Self { critical, warning }
    }

    /// Points removed for a status.
    pub fn for_status(&self, status: ProbeStatus) -> u8 {
        match status {
            ProbeStatus::Critical => self.critical,
            ProbeStatus::Warning | ProbeStatus::Degraded => self.warning,
            ProbeStatus::Healthy | ProbeStatus::Unknown => 0,
        }
    }
}

/// Policy turning probe statuses into a resilience score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePolicy {
    /// Score before deductions.
    pub base: u8,

    /// Lowest reportable score.
    pub floor: u8,

    /// Highest reportable score.
    pub ceiling: u8,

    /// Scores strictly below this trigger auto-healing.
    pub heal_below: u8,

    /// Scores strictly below this put consumers into degraded mode.
    pub degraded_below: u8,

    /// Fixed score reported once the check limit is reached.
    pub limited_score: u8,

    /// Database deductions.
    pub database: Deduction,

    /// External API deductions.
    pub apis: Deduction,

    /// Memory deductions.
    pub memory: Deduction,

    /// Performance deductions.
    pub performance: Deduction,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            base: 85,
            floor: 60,
            ceiling: 100,
            heal_below: 70,
            degraded_below: 80,
            limited_score: 85,
            database: Deduction::new(20, 10),
            apis: Deduction::new(15, 5),
            memory: Deduction::new(10, 3),
            performance: Deduction::new(0, 0),
        }
    }
}

impl ScorePolicy {
    /// Deduction table entry for a subsystem.
    pub fn deduction(&self, subsystem: Subsystem) -> Deduction {
        match subsystem {
            Subsystem::Database => self.database,
            Subsystem::Apis => self.apis,
            Subsystem::Memory => self.memory,
            Subsystem::Performance => self.performance,
        }
    }

    /// Clamp a raw score into `[floor, ceiling]`.
    pub fn clamp(&self, raw: i32) -> u8 {
        raw.clamp(i32::from(self.floor), i32::from(self.ceiling)) as u8
    }

    fn validate(&self) -> HealthResult<()> {
        if self.floor > self.ceiling {
            return Err(HealthError::Configuration(format!(
                "score floor {} exceeds ceiling {}",
                self.floor, self.ceiling
            )));
        }
        if self.ceiling > 100 {
            return Err(HealthError::Configuration(
                "score ceiling cannot exceed 100".into(),
            ));
        }
        let bounded = [
            ("base", self.base),
            ("limited_score", self.limited_score),
            ("heal_below", self.heal_below),
            ("degraded_below", self.degraded_below),
        ];
        for (name, value) in bounded {
            if value < self.floor || value > self.ceiling {
                return Err(HealthError::Configuration(format!(
                    "score {} {} is outside [{}, {}]",
                    name, value, self.floor, self.ceiling
                )));
            }
        }
        Ok(())
    }
}

/// An external endpoint checked by the API probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    /// Endpoint name; also names its circuit breaker.
    pub name: String,

    /// URL receiving the reachability request.
    pub url: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiEndpoint {
    /// Create an endpoint description.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout,
        }
    }

    /// Name of the breaker guarding this endpoint.
    pub fn breaker_name(&self) -> String {
        format!("api.{}", self.name)
    }
}

/// Subsystem probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Breaker name used by the database probe.
    pub database_service: String,

    /// Budget for the data store read.
    pub database_timeout: Duration,

    /// Completed reads slower than this count as failures.
    pub database_slow_threshold: Duration,

    /// Endpoints checked by the API probe.
    pub endpoints: Vec<ApiEndpoint>,

    /// Memory pressure at or above this ratio is a warning.
    pub memory_warning_ratio: f64,

    /// Memory pressure at or above this ratio is critical.
    pub memory_critical_ratio: f64,

    /// Render latency above this bound degrades performance.
    pub render_bound: Duration,

    /// Scheduling delay above this bound degrades performance.
    pub responsiveness_bound: Duration,

    /// Reported render latency is capped at this value.
    pub render_cap: Duration,

    /// Reported scheduling delay is capped at this value.
    pub responsiveness_cap: Duration,

    /// Budget for the memory and performance probes.
    pub local_probe_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            database_service: "datastore".to_string(),
            database_timeout: Duration::from_secs(3),
            database_slow_threshold: Duration::from_secs(3),
            endpoints: vec![ApiEndpoint::new(
                "health",
                "/api/health",
                Duration::from_secs(2),
            )],
            memory_warning_ratio: 0.75,
            memory_critical_ratio: 0.90,
            render_bound: Duration::from_millis(20),
            responsiveness_bound: Duration::from_millis(5),
            render_cap: Duration::from_millis(50),
            responsiveness_cap: Duration::from_millis(10),
            local_probe_timeout: Duration::from_secs(2),
        }
    }
}

impl ProbeConfig {
    fn validate(&self) -> HealthResult<()> {
        if self.database_timeout.is_zero() || self.local_probe_timeout.is_zero() {
            return Err(HealthError::Configuration(
                "probe timeouts must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.memory_warning_ratio)
            || !(0.0..=1.0).contains(&self.memory_critical_ratio)
            || self.memory_warning_ratio >= self.memory_critical_ratio
        {
            return Err(HealthError::Configuration(format!(
                "memory ratios must satisfy 0 <= warning ({}) < critical ({}) <= 1",
                self.memory_warning_ratio, self.memory_critical_ratio
            )));
        }
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.timeout.is_zero()) {
            return Err(HealthError::Configuration(format!(
                "endpoint {} has a zero timeout",
                endpoint.name
            )));
        }
        Ok(())
    }
}
