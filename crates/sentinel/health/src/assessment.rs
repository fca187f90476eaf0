//! Probe results, check snapshots and resilience scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ScorePolicy;
use crate::error::ProbeFault;

/// Subsystems probed on every check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// Data store reachability.
    Database,
    /// External API reachability.
    Apis,
    /// Runtime memory pressure.
    Memory,
    /// Scheduling and render responsiveness.
    Performance,
}

impl Subsystem {
    /// All subsystems in reporting order.
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Database,
        Subsystem::Apis,
        Subsystem::Memory,
        Subsystem::Performance,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Database => "database",
            Subsystem::Apis => "apis",
            Subsystem::Memory => "memory",
            Subsystem::Performance => "performance",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Subsystem is healthy.
    Healthy,
    /// Subsystem works but is under pressure.
    Warning,
    /// Subsystem partially works or is being served from a fallback.
    Degraded,
    /// Subsystem is failing.
    Critical,
    /// Subsystem state could not be determined.
    Unknown,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "healthy"),
            ProbeStatus::Warning => write!(f, "warning"),
            ProbeStatus::Degraded => write!(f, "degraded"),
            ProbeStatus::Critical => write!(f, "critical"),
            ProbeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one probe in one check cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Subsystem that was probed.
    pub subsystem: Subsystem,

    /// Classified status.
    pub status: ProbeStatus,

    /// Round-trip time of the real call, if one was made.
    pub response_time_ms: Option<u64>,

    /// The real call was skipped and consumers should serve fallback data.
    pub use_fallback: bool,

    /// Free-form diagnostics. Never consulted by control logic.
    pub detail: serde_json::Value,

    /// When the probe finished.
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Create a result with an empty detail payload.
    pub fn new(subsystem: Subsystem, status: ProbeStatus) -> Self {
        Self {
            subsystem,
            status,
            response_time_ms: None,
            use_fallback: false,
            detail: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Result reported when a subsystem's breaker is open.
    pub fn fallback(subsystem: Subsystem, message: impl Into<String>) -> Self {
        Self::new(subsystem, ProbeStatus::Degraded)
            .with_fallback()
            .with_response_time(0)
            .with_detail(serde_json::json!({ "message": message.into() }))
    }

    /// Convert a probe fault into a reportable result.
    pub fn from_fault(fault: &ProbeFault) -> Self {
        let status = match fault {
            ProbeFault::Indeterminate { .. } => ProbeStatus::Unknown,
            ProbeFault::Timeout { .. } | ProbeFault::Failed { .. } | ProbeFault::Panicked { .. } => {
                ProbeStatus::Critical
            }
        };
        let mut result = Self::new(fault.subsystem(), status)
            .with_detail(serde_json::json!({ "error": fault.to_string() }));
        if let ProbeFault::Timeout { timeout_ms, .. } = fault {
            result.response_time_ms = Some(*timeout_ms);
            result.use_fallback = true;
        }
        result
    }

    /// Set the response time.
    pub fn with_response_time(mut self, millis: u64) -> Self {
        self.response_time_ms = Some(millis);
        self
    }

    /// Mark the result as served from fallback.
    pub fn with_fallback(mut self) -> Self {
        self.use_fallback = true;
        self
    }

    /// Attach a diagnostic payload.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Settled probe results for the four fixed subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemResults {
    /// Data store reachability.
    pub database: ProbeResult,
    /// External endpoint reachability.
    pub apis: ProbeResult,
    /// Memory pressure.
    pub memory: ProbeResult,
    /// Runtime responsiveness.
    pub performance: ProbeResult,
}

impl SubsystemResults {
    /// Result for a subsystem.
    pub fn get(&self, subsystem: Subsystem) -> &ProbeResult {
        match subsystem {
            Subsystem::Database => &self.database,
            Subsystem::Apis => &self.apis,
            Subsystem::Memory => &self.memory,
            Subsystem::Performance => &self.performance,
        }
    }

    /// Iterate results in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = &ProbeResult> {
        Subsystem::ALL.into_iter().map(move |s| self.get(s))
    }

    /// Subsystems currently reporting critical.
    pub fn critical(&self) -> Vec<Subsystem> {
        self.iter()
            .filter(|r| r.status == ProbeStatus::Critical)
            .map(|r| r.subsystem)
            .collect()
    }
}

/// Fold settled results into a bounded resilience score.
///
/// Pure function of the statuses: completion order and detail payloads have
/// no influence.
pub fn resilience_score(results: &SubsystemResults, policy: &ScorePolicy) -> u8 {
    let deducted: i32 = results
        .iter()
        .map(|r| i32::from(policy.deduction(r.subsystem).for_status(r.status)))
        .sum();
    policy.clamp(i32::from(policy.base) - deducted)
}

/// Kind of snapshot a check cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// All probes ran and were scored.
    Complete,
    /// The check limit was reached; no probes ran.
    Limited,
}

/// How consumers should present the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResilienceMode {
    /// Serve live data.
    Normal,
    /// Show degraded-mode UI and serve cached or fallback data.
    Degraded,
}

/// Immutable result of one check cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSnapshot {
    /// Correlation id for logs and events.
    pub check_id: Uuid,

    /// When the snapshot was produced.
    pub timestamp: DateTime<Utc>,

    /// Complete or limited.
    pub status: SnapshotStatus,

    /// Per-subsystem results; absent on a limited snapshot.
    pub probe_results: Option<SubsystemResults>,

    /// Score in `[floor, ceiling]` of the policy that produced it.
    pub resilience_score: u8,

    /// Human readable note.
    pub message: Option<String>,
}

impl HealthCheckSnapshot {
    /// Score and wrap a full set of probe results.
    pub fn complete(results: SubsystemResults, policy: &ScorePolicy) -> Self {
        let resilience_score = resilience_score(&results, policy);
        Self {
            check_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            status: SnapshotStatus::Complete,
            probe_results: Some(results),
            resilience_score,
            message: None,
        }
    }

    /// Fixed snapshot returned while the check limit is engaged.
    pub fn limited(policy: &ScorePolicy) -> Self {
        Self {
            check_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            status: SnapshotStatus::Limited,
            probe_results: None,
            resilience_score: policy.limited_score,
            message: Some("Health check limit reached - protection active".to_string()),
        }
    }

    /// Result for a subsystem, if probes ran.
    pub fn result(&self, subsystem: Subsystem) -> Option<&ProbeResult> {
        self.probe_results.as_ref().map(|r| r.get(subsystem))
    }

    /// Whether the score calls for auto-healing.
    pub fn needs_healing(&self, policy: &ScorePolicy) -> bool {
        self.status == SnapshotStatus::Complete && self.resilience_score < policy.heal_below
    }

    /// Presentation mode for consumers.
    pub fn mode(&self, policy: &ScorePolicy) -> ResilienceMode {
        if self.resilience_score < policy.degraded_below {
            ResilienceMode::Degraded
        } else {
            ResilienceMode::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn results(db: ProbeStatus, apis: ProbeStatus, mem: ProbeStatus, perf: ProbeStatus) -> SubsystemResults {
        SubsystemResults {
            database: ProbeResult::new(Subsystem::Database, db),
            apis: ProbeResult::new(Subsystem::Apis, apis),
            memory: ProbeResult::new(Subsystem::Memory, mem),
            performance: ProbeResult::new(Subsystem::Performance, perf),
        }
    }

    fn any_status() -> impl Strategy<Value = ProbeStatus> {
        prop_oneof![
            Just(ProbeStatus::Healthy),
            Just(ProbeStatus::Warning),
            Just(ProbeStatus::Degraded),
            Just(ProbeStatus::Critical),
            Just(ProbeStatus::Unknown),
        ]
    }

    #[test]
    fn test_all_healthy_scores_base() {
        use ProbeStatus::Healthy;
        let policy = ScorePolicy::default();
        assert_eq!(resilience_score(&results(Healthy, Healthy, Healthy, Healthy), &policy), 85);
    }

    #[test]
    fn test_database_critical_scores_65() {
        use ProbeStatus::{Critical, Healthy};
        let policy = ScorePolicy::default();
        let snapshot = HealthCheckSnapshot::complete(results(Critical, Healthy, Healthy, Healthy), &policy);
        assert_eq!(snapshot.resilience_score, 65);
        assert!(snapshot.needs_healing(&policy));
        assert_eq!(snapshot.mode(&policy), ResilienceMode::Degraded);
    }

    #[test]
    fn test_everything_critical_hits_floor() {
        use ProbeStatus::Critical;
        let policy = ScorePolicy::default();
        assert_eq!(resilience_score(&results(Critical, Critical, Critical, Critical), &policy), 60);
    }

    #[test]
    fn test_warning_deductions() {
        use ProbeStatus::{Healthy, Warning};
        let policy = ScorePolicy::default();
        // 85 - 10 - 5 - 3
        assert_eq!(resilience_score(&results(Warning, Warning, Warning, Healthy), &policy), 67);
    }

    #[test]
    fn test_limited_snapshot() {
        let policy = ScorePolicy::default();
        let snapshot = HealthCheckSnapshot::limited(&policy);
        assert_eq!(snapshot.status, SnapshotStatus::Limited);
        assert_eq!(snapshot.resilience_score, 85);
        assert!(snapshot.probe_results.is_none());
        assert!(!snapshot.needs_healing(&policy));
    }

    #[test]
    fn test_fault_conversion() {
        let timeout = ProbeFault::Timeout { subsystem: Subsystem::Database, timeout_ms: 3000 };
        let result = ProbeResult::from_fault(&timeout);
        assert_eq!(result.status, ProbeStatus::Critical);
        assert!(result.use_fallback);

        let unknown = ProbeFault::Indeterminate {
            subsystem: Subsystem::Memory,
            reason: "no counters".into(),
        };
        assert_eq!(ProbeResult::from_fault(&unknown).status, ProbeStatus::Unknown);
    }

    proptest! {
        #[test]
        fn prop_score_within_bounds(
            db in any_status(),
            apis in any_status(),
            mem in any_status(),
            perf in any_status(),
        ) {
            let policy = ScorePolicy::default();
            let score = resilience_score(&results(db, apis, mem, perf), &policy);
            prop_assert!((60..=100).contains(&score));
        }
    }
}
