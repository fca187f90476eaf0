//! Health check scheduling loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sentinel_health::{HealthCheckOrchestrator, HealthEvent, SnapshotStatus};
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Drives `run_check()` on a fixed interval until shutdown
pub struct CheckScheduler {
    core: Arc<HealthCheckOrchestrator>,
    interval: Duration,
    limit_reset: Option<Duration>,
}

impl CheckScheduler {
    /// Create a scheduler
    pub fn new(core: Arc<HealthCheckOrchestrator>, interval: Duration) -> Self {
        Self {
            core,
            interval,
            limit_reset: None,
        }
    }

    /// Clear the check limit every `period`
    pub fn with_limit_reset(mut self, period: Duration) -> Self {
        self.limit_reset = (!period.is_zero()).then_some(period);
        self
    }

    /// Run until `shutdown` resolves, returning the number of executed checks
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> u64 {
        let events = tokio::spawn(log_events(self.core.subscribe()));

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reset_ticker = self.limit_reset.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        tokio::pin!(shutdown);
        let mut executed = 0;

        tracing::info!(interval_secs = self.interval.as_secs(), "Check scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.core.run_check().await {
                        Some(snapshot) if snapshot.status == SnapshotStatus::Complete => {
                            executed += 1;
                        }
                        Some(_) => {
                            tracing::warn!("Health check limit reached, checks paused until reset");
                        }
                        None => {}
                    }
                }
                _ = tick_optional(&mut reset_ticker) => {
                    self.core.reset_health_check_limit();
                }
                _ = &mut shutdown => break,
            }
        }

        self.core.shutdown();
        events.abort();
        tracing::info!(executed, "Check scheduler stopped");
        executed
    }
}

async fn tick_optional(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn log_events(mut rx: broadcast::Receiver<HealthEvent>) {
    loop {
        match rx.recv().await {
            Ok(HealthEvent::SnapshotProduced { snapshot, mode }) => {
                tracing::info!(
                    check_id = %snapshot.check_id,
                    score = snapshot.resilience_score,
                    mode = ?mode,
                    "Snapshot"
                );
                if let Ok(json) = serde_json::to_string(&snapshot) {
                    tracing::debug!(snapshot = %json, "Snapshot detail");
                }
            }
            Ok(HealthEvent::HealingCompleted { report }) => {
                tracing::info!(
                    check_id = %report.check_id,
                    actions = report.actions.len(),
                    succeeded = report.succeeded(),
                    timed_out = report.timed_out,
                    "Healing completed"
                );
            }
            Ok(event) => tracing::debug!(?event, "Health event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_health::testing::{
        FakeDataStore, FakeEndpointChecker, FixedLatencySampler, FixedMemoryGauge,
    };
    use sentinel_health::{ResilienceConfig, ResilienceCoreBuilder};

    fn core(config: ResilienceConfig) -> Arc<HealthCheckOrchestrator> {
        Arc::new(
            ResilienceCoreBuilder::new()
                .with_config(config)
                .with_data_store(Arc::new(FakeDataStore::new()))
                .with_endpoint_checker(Arc::new(FakeEndpointChecker::new(200)))
                .with_memory_gauge(Arc::new(FixedMemoryGauge::unavailable()))
                .with_latency_sampler(Arc::new(FixedLatencySampler::default()))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_shutdown() {
        let mut config = ResilienceConfig::default();
        config.checks.cooldown = Duration::from_secs(10);
        let core = core(config);

        let scheduler = CheckScheduler::new(core.clone(), Duration::from_secs(10));
        let executed = scheduler
            .run(tokio::time::sleep(Duration::from_secs(25)))
            .await;

        // Ticks at 0s, 10s and 20s.
        assert_eq!(executed, 3);
        assert_eq!(core.status().health_check_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_reset_resumes_checks() {
        let mut config = ResilienceConfig::default();
        config.checks.cooldown = Duration::from_secs(1);
        config.checks.max_checks = 2;
        let core = core(config);

        let scheduler = CheckScheduler::new(core.clone(), Duration::from_secs(1))
            .with_limit_reset(Duration::from_millis(4500));
        let executed = scheduler
            .run(tokio::time::sleep(Duration::from_millis(5500)))
            .await;

        // Two checks before the limit, one more after the reset at 4.5s.
        assert_eq!(executed, 3);
        assert_eq!(core.status().health_check_count, 1);
    }
}
