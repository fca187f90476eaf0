//! Registry of circuit breakers keyed by service name.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::config::CircuitBreakerConfig;

/// Lazily creates and hands out one breaker per dependent service.
///
/// Entries are never removed; a breaker lives as long as the registry.
pub struct CircuitBreakerRegistry {
    /// Defaults for newly created breakers.
    config: CircuitBreakerConfig,

    /// Breakers per service name.
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for a service.
    pub fn get(&self, service_name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service_name) {
            return existing.clone();
        }

        self.breakers
            .entry(service_name.to_string())
            .or_insert_with(|| {
                debug!(service = %service_name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(service_name, self.config.clone()))
            })
            .clone()
    }

    /// Look up a breaker without creating it.
    pub fn find(&self, service_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service_name).map(|b| b.clone())
    }

    /// Names of all registered breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Statistics for every registered breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<CircuitBreakerStats> =
            self.breakers.iter().map(|r| r.value().stats()).collect();
        stats.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        stats
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Cancel every pending recovery timer.
    pub fn shutdown(&self) {
        for breaker in self.breakers.iter() {
            breaker.value().cancel_pending();
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    #[test]
    fn test_get_is_idempotent() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.get("datastore");
        let second = registry.get("datastore");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_breakers_are_independent() {
        let registry = CircuitBreakerRegistry::default();
        let db = registry.get("datastore");
        let api = registry.get("api.health");

        for _ in 0..3 {
            db.record_failure();
        }

        assert_eq!(db.state(), CircuitState::Open);
        assert_eq!(api.state(), CircuitState::Closed);
        assert_eq!(registry.names(), vec!["api.health", "datastore"]);
    }

    #[test]
    fn test_find_does_not_create() {
        let registry = CircuitBreakerRegistry::default();
        assert!(registry.find("datastore").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timers() {
        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: std::time::Duration::from_millis(10),
        });
        let breaker = registry.get("datastore");
        breaker.record_failure();
        registry.shutdown();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
