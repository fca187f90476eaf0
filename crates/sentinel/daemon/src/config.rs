//! Configuration for sentinel-daemon

use std::time::Duration;

use sentinel_health::{ApiEndpoint, ResilienceConfig};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Data store probed by the database check
    #[serde(default)]
    pub datastore: DataStoreConfig,

    /// External endpoints probed by the API check
    #[serde(default)]
    pub api: ApiConfig,

    /// Check scheduling and rate limiting
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Circuit breaker defaults
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Auto-healing settings
    #[serde(default)]
    pub healing: HealingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// REST base URL of the data store
    pub url: String,

    /// Table read by the minimal probe query
    #[serde(default = "default_table")]
    pub table: String,

    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub timeout_ms: u64,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321/rest/v1".to_string(),
            table: default_table(),
            api_key: None,
            timeout_ms: default_read_timeout(),
        }
    }
}

/// External API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL that relative endpoint paths resolve against
    #[serde(default = "default_base_url")]
    pub base_url: Option<String>,

    /// Endpoints to check
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: default_endpoints(),
        }
    }
}

/// A single endpoint to check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint name
    pub name: String,

    /// Absolute URL or path
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_ms: u64,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between check attempts in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Minimum spacing between executed checks in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Executed checks allowed before the limit engages
    #[serde(default = "default_max_checks")]
    pub max_checks: u32,

    /// Clear the check limit automatically every this many seconds; 0 disables
    #[serde(default)]
    pub limit_reset_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            cooldown_secs: default_cooldown(),
            max_checks: default_max_checks(),
            limit_reset_secs: 0,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open a circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before a trial call
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
        }
    }
}

/// Auto-healing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Enable auto-healing
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout over a whole healing batch in seconds
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_timeout_secs: default_batch_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_table() -> String {
    "profiles".to_string()
}

fn default_read_timeout() -> u64 {
    3_000
}

fn default_base_url() -> Option<String> {
    Some("http://localhost:8080".to_string())
}

fn default_endpoint_timeout() -> u64 {
    2_000
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![EndpointConfig {
        name: "health".to_string(),
        url: "/api/health".to_string(),
        timeout_ms: default_endpoint_timeout(),
    }]
}

fn default_interval() -> u64 {
    30
}

fn default_cooldown() -> u64 {
    30
}

fn default_max_checks() -> u32 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout() -> u64 {
    30
}

fn default_batch_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and `SENTINEL_` variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables, e.g. SENTINEL_SCHEDULER__INTERVAL_SECS
        builder = builder.add_source(
            config::Environment::with_prefix("SENTINEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject endpoint paths that cannot be resolved to a full URL
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.api.base_url.is_some() {
            return Ok(());
        }
        match self.api.endpoints.iter().find(|e| !is_absolute_url(&e.url)) {
            Some(endpoint) => Err(config::ConfigError::Message(format!(
                "endpoint {} uses relative url {} but api.base_url is not set",
                endpoint.name, endpoint.url
            ))),
            None => Ok(()),
        }
    }

    /// Resilience core configuration derived from this daemon configuration
    pub fn resilience(&self) -> ResilienceConfig {
        let mut config = ResilienceConfig::default();

        config.circuit_breaker.failure_threshold = self.breaker.failure_threshold;
        config.circuit_breaker.recovery_timeout =
            Duration::from_secs(self.breaker.recovery_timeout_secs);

        config.checks.cooldown = Duration::from_secs(self.scheduler.cooldown_secs);
        config.checks.max_checks = self.scheduler.max_checks;

        config.healing.enabled = self.healing.enabled;
        config.healing.batch_timeout = Duration::from_secs(self.healing.batch_timeout_secs);

        config.probes.database_timeout = Duration::from_millis(self.datastore.timeout_ms);
        config.probes.database_slow_threshold = Duration::from_millis(self.datastore.timeout_ms);
        config.probes.endpoints = self
            .api
            .endpoints
            .iter()
            .map(|e| ApiEndpoint::new(&e.name, &e.url, Duration::from_millis(e.timeout_ms)))
            .collect();

        config
    }

    /// Interval between check attempts
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs.max(1))
    }
}

fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
