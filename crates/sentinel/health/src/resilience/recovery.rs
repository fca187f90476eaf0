//! Remediation actions and their outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::Subsystem;

/// A bounded remediation for a critical subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealingAction {
    /// Force a service's circuit breaker closed.
    ResetBreaker {
        /// Breaker to reset.
        service: String,
    },

    /// Ask the runtime to release memory, if it exposes a hook.
    ReclaimMemory,
}

impl HealingAction {
    /// Remediation defined for a critical subsystem, if any.
    pub fn for_subsystem(subsystem: Subsystem, database_service: &str) -> Option<Self> {
        match subsystem {
            Subsystem::Database => Some(HealingAction::ResetBreaker {
                service: database_service.to_string(),
            }),
            Subsystem::Memory => Some(HealingAction::ReclaimMemory),
            Subsystem::Apis | Subsystem::Performance => None,
        }
    }

    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            HealingAction::ResetBreaker { service } => format!("Reset breaker {}", service),
            HealingAction::ReclaimMemory => "Reclaim memory".to_string(),
        }
    }
}

impl std::fmt::Display for HealingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Outcome of a single remediation action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingOutcome {
    /// Action that was attempted.
    pub action: HealingAction,

    /// Whether the action succeeded.
    pub success: bool,

    /// Duration of the action in milliseconds.
    pub duration_ms: u64,

    /// Error message if failed.
    pub error: Option<String>,
}

impl HealingOutcome {
    /// Create a successful outcome.
    pub fn success(action: HealingAction, duration_ms: u64) -> Self {
        Self {
            action,
            success: true,
            duration_ms,
            error: None,
        }
    }

    /// Create a failed outcome.
    pub fn failure(action: HealingAction, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

/// Summary of one healing batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingReport {
    /// Check cycle that triggered the batch.
    pub check_id: Uuid,

    /// Actions selected for the batch.
    pub actions: Vec<HealingAction>,

    /// Outcomes of actions that settled before the batch timeout.
    pub outcomes: Vec<HealingOutcome>,

    /// The batch timeout elapsed before every action settled.
    pub timed_out: bool,

    /// Time the batch was started.
    pub started_at: DateTime<Utc>,

    /// Time the batch was released.
    pub completed_at: DateTime<Utc>,
}

impl HealingReport {
    /// Number of actions that settled successfully.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_only_for_database_and_memory() {
        assert_eq!(
            HealingAction::for_subsystem(Subsystem::Database, "datastore"),
            Some(HealingAction::ResetBreaker {
                service: "datastore".to_string()
            })
        );
        assert_eq!(
            HealingAction::for_subsystem(Subsystem::Memory, "datastore"),
            Some(HealingAction::ReclaimMemory)
        );
        assert!(HealingAction::for_subsystem(Subsystem::Apis, "datastore").is_none());
        assert!(HealingAction::for_subsystem(Subsystem::Performance, "datastore").is_none());
    }
}
