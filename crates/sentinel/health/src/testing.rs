//! In-memory transports for exercising the resilience core without a
//! network, a data store or procfs.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ApiEndpoint;
use crate::error::{HealthError, HealthResult};
use crate::probes::{DataStore, EndpointChecker, LatencySampler, MemoryGauge, MemorySample};

/// Data store whose health can be flipped at runtime.
#[derive(Debug, Default)]
pub struct FakeDataStore {
    failing: AtomicBool,
    delay: Mutex<Duration>,
    reads: AtomicU32,
}

impl FakeDataStore {
    /// A healthy store answering immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reads fail or succeed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent read.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Reads issued so far.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for FakeDataStore {
    fn name(&self) -> &str {
        "fake"
    }

    async fn minimal_read(&self) -> HealthResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HealthError::DataStore {
                store: "fake".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

/// Endpoint checker answering every endpoint with the same status code.
#[derive(Debug)]
pub struct FakeEndpointChecker {
    status: AtomicU16,
}

impl FakeEndpointChecker {
    /// Answer with `status`.
    pub fn new(status: u16) -> Self {
        Self {
            status: AtomicU16::new(status),
        }
    }

    /// Change the status code returned from now on.
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

#[async_trait]
impl EndpointChecker for FakeEndpointChecker {
    async fn head(&self, _endpoint: &ApiEndpoint) -> HealthResult<u16> {
        Ok(self.status.load(Ordering::SeqCst))
    }
}

/// Memory gauge reporting a fixed pressure, or no counters at all.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryGauge(pub Option<MemorySample>);

impl FixedMemoryGauge {
    /// Gauge reporting `used` out of `limit` bytes.
    pub fn pressure(used: u64, limit: u64) -> Self {
        Self(Some(MemorySample {
            used_bytes: used,
            total_bytes: limit,
            limit_bytes: limit,
        }))
    }

    /// Gauge for a runtime without memory counters.
    pub fn unavailable() -> Self {
        Self(None)
    }
}

impl MemoryGauge for FixedMemoryGauge {
    fn sample(&self) -> HealthResult<Option<MemorySample>> {
        Ok(self.0)
    }
}

/// Latency sampler returning fixed measurements.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLatencySampler {
    /// Render latency reported.
    pub render: Duration,
    /// Scheduling delay reported.
    pub responsiveness: Duration,
}

#[async_trait]
impl LatencySampler for FixedLatencySampler {
    async fn render_latency(&self) -> HealthResult<Duration> {
        Ok(self.render)
    }

    async fn scheduling_delay(&self) -> Duration {
        self.responsiveness
    }
}
