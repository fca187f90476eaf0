//! Error types for sentinel-daemon

use thiserror::Error;

/// Daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The resilience core could not be built
    #[error("Health core error: {0}")]
    Health(#[from] sentinel_health::HealthError),

    /// Outbound HTTP client setup failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Signal handling failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
