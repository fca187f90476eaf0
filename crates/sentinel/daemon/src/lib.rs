//! Sentinel Daemon library
//!
//! This module provides the components of the `sentineld` daemon:
//! - Layered configuration
//! - REST data store transport
//! - Interval-driven check scheduling

pub mod config;
pub mod datastore;
pub mod error;
pub mod scheduler;

pub use config::DaemonConfig;
pub use datastore::RestDataStore;
pub use error::{DaemonError, DaemonResult};
pub use scheduler::CheckScheduler;
