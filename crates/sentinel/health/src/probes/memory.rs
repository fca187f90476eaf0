//! Runtime memory pressure probe.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use super::{Probe, ProbeOutcome};
use crate::assessment::{ProbeResult, ProbeStatus, Subsystem};
use crate::error::{HealthError, HealthResult, ProbeFault};

const MIB: f64 = 1024.0 * 1024.0;

/// One reading of the runtime memory counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Bytes currently in use by the process.
    pub used_bytes: u64,

    /// Bytes the runtime has reserved or the host exposes.
    pub total_bytes: u64,

    /// Hard limit the process may grow to.
    pub limit_bytes: u64,
}

impl MemorySample {
    /// Fraction of the limit currently in use.
    pub fn pressure(&self) -> Option<f64> {
        (self.limit_bytes > 0).then(|| self.used_bytes as f64 / self.limit_bytes as f64)
    }
}

/// Source of memory counters.
///
/// `Ok(None)` means the runtime exposes no counters, which is not a failure.
pub trait MemoryGauge: Send + Sync {
    /// Take a sample of the memory counters.
    fn sample(&self) -> HealthResult<Option<MemorySample>>;
}

/// [`MemoryGauge`] reading Linux procfs and the cgroup v2 memory limit.
#[derive(Debug, Clone)]
pub struct ProcMemoryGauge {
    proc_root: PathBuf,
    cgroup_max: PathBuf,
}

impl Default for ProcMemoryGauge {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            cgroup_max: PathBuf::from("/sys/fs/cgroup/memory.max"),
        }
    }
}

impl ProcMemoryGauge {
    /// Create a gauge rooted at alternative procfs and cgroup paths.
    pub fn with_paths(proc_root: impl Into<PathBuf>, cgroup_max: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cgroup_max: cgroup_max.into(),
        }
    }

    fn read_kib(path: &Path, key: &str) -> HealthResult<Option<u64>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HealthError::MemoryCounters(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };
        parse_kib(&contents, key)
            .map(|kib| Some(kib * 1024))
            .ok_or_else(|| {
                HealthError::MemoryCounters(format!("{} missing from {}", key, path.display()))
            })
    }

    fn cgroup_limit(&self) -> Option<u64> {
        std::fs::read_to_string(&self.cgroup_max)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
    }
}

impl MemoryGauge for ProcMemoryGauge {
    fn sample(&self) -> HealthResult<Option<MemorySample>> {
        let Some(used_bytes) = Self::read_kib(&self.proc_root.join("self/status"), "VmRSS:")? else {
            return Ok(None);
        };
        let Some(total_bytes) = Self::read_kib(&self.proc_root.join("meminfo"), "MemTotal:")? else {
            return Ok(None);
        };

        let limit_bytes = self
            .cgroup_limit()
            .map_or(total_bytes, |limit| limit.min(total_bytes));

        Ok(Some(MemorySample {
            used_bytes,
            total_bytes,
            limit_bytes,
        }))
    }
}

fn parse_kib(contents: &str, key: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Probe classifying memory pressure.
pub struct MemoryProbe {
    gauge: Arc<dyn MemoryGauge>,
    timeout: Duration,
    warning_ratio: f64,
    critical_ratio: f64,
}

impl MemoryProbe {
    /// Create a memory probe.
    pub fn new(
        gauge: Arc<dyn MemoryGauge>,
        timeout: Duration,
        warning_ratio: f64,
        critical_ratio: f64,
    ) -> Self {
        Self {
            gauge,
            timeout,
            warning_ratio,
            critical_ratio,
        }
    }

    fn classify(&self, pressure: f64) -> ProbeStatus {
        if pressure < self.warning_ratio {
            ProbeStatus::Healthy
        } else if pressure < self.critical_ratio {
            ProbeStatus::Warning
        } else {
            ProbeStatus::Critical
        }
    }
}

fn recommendation(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Critical => "Reduce working set or restart the client",
        ProbeStatus::Warning => "Monitor memory growth",
        _ => "Memory usage is within normal range",
    }
}

#[async_trait]
impl Probe for MemoryProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Memory
    }

    #[instrument(skip(self), fields(probe = "memory"))]
    async fn execute(&self) -> ProbeOutcome {
        let gauge = self.gauge.clone();
        let read = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || gauge.sample()),
        )
        .await;

        let sample = match read {
            Ok(Ok(Ok(sample))) => sample,
            Ok(Ok(Err(e))) => {
                return Err(ProbeFault::Indeterminate {
                    subsystem: Subsystem::Memory,
                    reason: e.to_string(),
                })
            }
            Ok(Err(join_error)) => {
                return Err(ProbeFault::Panicked {
                    subsystem: Subsystem::Memory,
                    reason: join_error.to_string(),
                })
            }
            Err(_) => {
                return Err(ProbeFault::Timeout {
                    subsystem: Subsystem::Memory,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        let Some(sample) = sample else {
            debug!("Memory counters unavailable");
            return Ok(
                ProbeResult::new(Subsystem::Memory, ProbeStatus::Healthy).with_detail(json!({
                    "note": "Memory API not available - monitoring reduced",
                })),
            );
        };

        let Some(pressure) = sample.pressure() else {
            return Err(ProbeFault::Indeterminate {
                subsystem: Subsystem::Memory,
                reason: "memory limit reported as zero".into(),
            });
        };

        let status = self.classify(pressure);
        Ok(ProbeResult::new(Subsystem::Memory, status).with_detail(json!({
            "used_mb": (sample.used_bytes as f64 / MIB).round() as u64,
            "total_mb": (sample.total_bytes as f64 / MIB).round() as u64,
            "limit_mb": (sample.limit_bytes as f64 / MIB).round() as u64,
            "usage_percent": (pressure * 100.0).round() as u64,
            "recommendation": recommendation(status),
        })))
    }
}
