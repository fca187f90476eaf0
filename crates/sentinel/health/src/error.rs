//! Error types for sentinel-health crate.
//!
//! Defines crate-level errors and the typed fault a probe returns instead of
//! unwinding into the orchestrator.

use thiserror::Error;

use crate::assessment::Subsystem;

/// Errors that can occur in the resilience core and its transports.
#[derive(Debug, Error)]
pub enum HealthError {
    /// The data store rejected or failed the probe read.
    #[error("data store {store} failed: {reason}")]
    DataStore { store: String, reason: String },

    /// An external endpoint could not be reached.
    #[error("endpoint {endpoint} unreachable: {reason}")]
    Endpoint { endpoint: String, reason: String },

    /// Runtime memory counters could not be read.
    #[error("memory counters unreadable: {0}")]
    MemoryCounters(String),

    /// A remediation action failed.
    #[error("remediation {action} failed: {reason}")]
    RemediationFailed { action: String, reason: String },

    /// The healing batch exceeded its timeout.
    #[error("healing batch timed out after {timeout_ms}ms")]
    HealingTimeout { timeout_ms: u64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Fault raised inside a probe boundary.
///
/// Faults are data: the orchestrator converts each one into a
/// [`ProbeResult`](crate::assessment::ProbeResult) so nothing escapes a check
/// cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeFault {
    /// The probe exceeded its own time budget.
    #[error("{subsystem} probe timed out after {timeout_ms}ms")]
    Timeout { subsystem: Subsystem, timeout_ms: u64 },

    /// The probe failed before it could classify the subsystem.
    #[error("{subsystem} probe failed: {reason}")]
    Failed { subsystem: Subsystem, reason: String },

    /// The subsystem state could not be determined.
    #[error("{subsystem} probe indeterminate: {reason}")]
    Indeterminate { subsystem: Subsystem, reason: String },

    /// The probe task panicked or was cancelled.
    #[error("{subsystem} probe aborted: {reason}")]
    Panicked { subsystem: Subsystem, reason: String },
}

impl ProbeFault {
    /// Subsystem the fault belongs to.
    pub fn subsystem(&self) -> Subsystem {
        match self {
            ProbeFault::Timeout { subsystem, .. }
            | ProbeFault::Failed { subsystem, .. }
            | ProbeFault::Indeterminate { subsystem, .. }
            | ProbeFault::Panicked { subsystem, .. } => *subsystem,
        }
    }
}
