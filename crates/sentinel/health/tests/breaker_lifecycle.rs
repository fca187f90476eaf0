//! Circuit breaker lifecycle through the public registry API.

use std::time::Duration;

use sentinel_health::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};

fn registry() -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout: Duration::from_secs(30),
    })
}

#[tokio::test(start_paused = true)]
async fn three_failures_open_then_trial_success_closes() {
    let registry = registry();
    let breaker = registry.get("datastore");

    for _ in 0..3 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn registry_returns_one_breaker_per_service() {
    let registry = registry();
    let a = registry.get("api.health");
    let b = registry.get("api.health");
    registry.get("datastore");

    a.record_failure();
    assert_eq!(b.failure_count(), 1);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["api.health", "datastore"]);
    assert!(registry.find("api.quotes").is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_recovery() {
    let registry = registry();
    let breaker = registry.get("datastore");
    for _ in 0..3 {
        breaker.record_failure();
    }

    registry.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn stats_report_counts_and_last_failure() {
    let registry = registry();
    let breaker = registry.get("datastore");
    breaker.record_success();
    breaker.record_failure();

    let stats = breaker.stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.failure_threshold, 3);
    assert!(stats.last_failure_time.is_some());
}
