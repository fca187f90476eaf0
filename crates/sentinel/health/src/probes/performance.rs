//! Render latency and scheduling responsiveness probe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tracing::instrument;

use super::{Probe, ProbeOutcome};
use crate::assessment::{ProbeResult, ProbeStatus, Subsystem};
use crate::config::ProbeConfig;
use crate::error::{HealthError, HealthResult, ProbeFault};

const SUB_SCORE_BASE: u8 = 90;
const SUB_SCORE_FLOOR: u8 = 70;
const RENDER_PENALTY: u8 = 10;
const RESPONSIVENESS_PENALTY: u8 = 5;

/// Measures the latencies the performance probe classifies.
#[async_trait]
pub trait LatencySampler: Send + Sync {
    /// Time for one unit of render work to be scheduled and completed.
    async fn render_latency(&self) -> HealthResult<Duration>;

    /// Delay between yielding to the scheduler and being resumed.
    async fn scheduling_delay(&self) -> Duration;
}

/// [`LatencySampler`] measuring the Tokio runtime the probe runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeLatencySampler;

#[async_trait]
impl LatencySampler for RuntimeLatencySampler {
    async fn render_latency(&self) -> HealthResult<Duration> {
        let start = Instant::now();
        // Empty task: only the scheduler round trip is measured.
        tokio::spawn(async {})
            .await
            .map_err(|e| HealthError::Internal(format!("render task: {}", e)))?;
        Ok(start.elapsed())
    }

    async fn scheduling_delay(&self) -> Duration {
        let start = Instant::now();
        tokio::task::yield_now().await;
        start.elapsed()
    }
}

fn millis_f64(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

/// Performance sub-score; never used directly in the resilience score.
fn sub_score(render_slow: bool, responsiveness_slow: bool) -> u8 {
    let mut score = SUB_SCORE_BASE;
    if render_slow {
        score -= RENDER_PENALTY;
    }
    if responsiveness_slow {
        score -= RESPONSIVENESS_PENALTY;
    }
    score.max(SUB_SCORE_FLOOR)
}

/// Probe sampling runtime responsiveness.
pub struct PerformanceProbe {
    sampler: Arc<dyn LatencySampler>,
    render_bound: Duration,
    responsiveness_bound: Duration,
    render_cap: Duration,
    responsiveness_cap: Duration,
    timeout: Duration,
}

impl PerformanceProbe {
    /// Create a performance probe using the bounds from `config`.
    pub fn new(sampler: Arc<dyn LatencySampler>, config: &ProbeConfig) -> Self {
        Self {
            sampler,
            render_bound: config.render_bound,
            responsiveness_bound: config.responsiveness_bound,
            render_cap: config.render_cap,
            responsiveness_cap: config.responsiveness_cap,
            timeout: config.local_probe_timeout,
        }
    }
}

#[async_trait]
impl Probe for PerformanceProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Performance
    }

    #[instrument(skip(self), fields(probe = "performance"))]
    async fn execute(&self) -> ProbeOutcome {
        let sampled = tokio::time::timeout(self.timeout, async {
            let render = self.sampler.render_latency().await;
            let responsiveness = self.sampler.scheduling_delay().await;
            (render, responsiveness)
        })
        .await;

        let (render, responsiveness) = match sampled {
            Ok((Ok(render), responsiveness)) => (render, responsiveness),
            Ok((Err(e), _)) => {
                return Err(ProbeFault::Failed {
                    subsystem: Subsystem::Performance,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProbeFault::Timeout {
                    subsystem: Subsystem::Performance,
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let render = render.min(self.render_cap);
        let responsiveness = responsiveness.min(self.responsiveness_cap);
        let render_slow = render > self.render_bound;
        let responsiveness_slow = responsiveness > self.responsiveness_bound;

        let status = if render_slow || responsiveness_slow {
            ProbeStatus::Warning
        } else {
            ProbeStatus::Healthy
        };

        let mut recommendations = Vec::new();
        if render_slow {
            recommendations.push("Reduce render work per frame");
        }
        if responsiveness_slow {
            recommendations.push("Break up long-running tasks");
        }

        Ok(ProbeResult::new(Subsystem::Performance, status)
            .with_response_time(render.as_millis() as u64)
            .with_detail(json!({
                "render_time_ms": millis_f64(render),
                "responsiveness_ms": millis_f64(responsiveness),
                "score": sub_score(render_slow, responsiveness_slow),
                "recommendations": recommendations,
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSampler {
        render: Duration,
        responsiveness: Duration,
    }

    #[async_trait]
    impl LatencySampler for FixedSampler {
        async fn render_latency(&self) -> HealthResult<Duration> {
            Ok(self.render)
        }

        async fn scheduling_delay(&self) -> Duration {
            self.responsiveness
        }
    }

    struct StuckSampler;

    #[async_trait]
    impl LatencySampler for StuckSampler {
        async fn render_latency(&self) -> HealthResult<Duration> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Duration::ZERO)
        }

        async fn scheduling_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    struct BrokenSampler;

    #[async_trait]
    impl LatencySampler for BrokenSampler {
        async fn render_latency(&self) -> HealthResult<Duration> {
            Err(HealthError::Internal("render task cancelled".into()))
        }

        async fn scheduling_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn probe(render_ms: u64, responsiveness_ms: u64) -> PerformanceProbe {
        PerformanceProbe::new(
            Arc::new(FixedSampler {
                render: Duration::from_millis(render_ms),
                responsiveness: Duration::from_millis(responsiveness_ms),
            }),
            &ProbeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fast_runtime_is_healthy() {
        let result = probe(4, 1).execute().await.unwrap();
        assert_eq!(result.status, ProbeStatus::Healthy);
        assert_eq!(result.detail["score"], 90);
    }

    #[tokio::test]
    async fn test_slow_render_is_warning() {
        let result = probe(35, 1).execute().await.unwrap();
        assert_eq!(result.status, ProbeStatus::Warning);
        assert_eq!(result.detail["score"], 80);
    }

    #[tokio::test]
    async fn test_samples_are_capped() {
        let result = probe(500, 500).execute().await.unwrap();
        assert_eq!(result.status, ProbeStatus::Warning);
        assert_eq!(result.response_time_ms, Some(50));
        assert_eq!(result.detail["responsiveness_ms"], 10.0);
        assert_eq!(result.detail["score"], 75);
    }

    #[tokio::test]
    async fn test_bound_is_exclusive() {
        let result = probe(20, 5).execute().await.unwrap();
        assert_eq!(result.status, ProbeStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_sampler_times_out() {
        let probe = PerformanceProbe::new(Arc::new(StuckSampler), &ProbeConfig::default());
        let fault = probe.execute().await.unwrap_err();
        assert!(matches!(fault, ProbeFault::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_sampler_error_is_failed_fault() {
        let probe = PerformanceProbe::new(Arc::new(BrokenSampler), &ProbeConfig::default());
        let fault = probe.execute().await.unwrap_err();
        assert!(matches!(fault, ProbeFault::Failed { .. }));

        let result = ProbeResult::from_fault(&fault);
        assert_eq!(result.status, ProbeStatus::Critical);
        assert!(!result.use_fallback);
        assert!(result.detail["error"]
            .as_str()
            .unwrap()
            .contains("render task cancelled"));
    }

    #[tokio::test]
    async fn test_runtime_sampler_measures() {
        let sampler = RuntimeLatencySampler;
        assert!(sampler.render_latency().await.unwrap() < Duration::from_secs(5));
        assert!(sampler.scheduling_delay().await < Duration::from_secs(5));
    }

    #[test]
    fn test_sub_score_floor() {
        assert_eq!(sub_score(false, false), 90);
        assert_eq!(sub_score(true, true), 75);
        assert!(sub_score(true, true) >= SUB_SCORE_FLOOR);
    }
}
