//! Sentinel Daemon - Periodic resilience checks
//!
//! The daemon:
//! - Loads layered configuration
//! - Wires real data store and endpoint transports into the resilience core
//! - Runs health checks on an interval until Ctrl+C or SIGTERM

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sentinel_daemon::{CheckScheduler, DaemonConfig, DaemonError, DaemonResult, RestDataStore};
use sentinel_health::probes::HttpEndpointChecker;
use sentinel_health::ResilienceCoreBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sentinel Daemon CLI
#[derive(Parser)]
#[command(name = "sentineld")]
#[command(about = "Sentinel Daemon - Periodic resilience checks", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SENTINEL_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "SENTINEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SENTINEL_LOG_JSON")]
    json: bool,

    /// Seconds between check attempts
    #[arg(short, long, env = "SENTINEL_INTERVAL_SECS")]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(secs) = cli.interval_secs {
        config.scheduler.interval_secs = secs;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut endpoint_checker = HttpEndpointChecker::new()?;
    if let Some(base_url) = &config.api.base_url {
        endpoint_checker = endpoint_checker.with_base_url(base_url.clone());
    }

    let core = ResilienceCoreBuilder::new()
        .with_config(config.resilience())
        .with_data_store(Arc::new(RestDataStore::new(&config.datastore)?))
        .with_endpoint_checker(Arc::new(endpoint_checker))
        .build()?;
    core.activate();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        datastore = %config.datastore.url,
        endpoints = config.api.endpoints.len(),
        "Sentinel daemon starting"
    );

    let scheduler = CheckScheduler::new(Arc::new(core), config.interval())
        .with_limit_reset(Duration::from_secs(config.scheduler.limit_reset_secs));
    scheduler.run(shutdown_signal()).await;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
