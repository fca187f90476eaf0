//! Resilience patterns for the health core.
//!
//! Provides circuit breakers, their registry, remediation actions and the
//! auto-healing controller.

mod circuit_breaker;
mod healing;
mod recovery;
mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use healing::{AutoHealingController, MemoryReclaimer, AUTO_HEALING_OPERATION};
pub use recovery::{HealingAction, HealingOutcome, HealingReport};
pub use registry::CircuitBreakerRegistry;
