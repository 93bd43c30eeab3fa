//! Price oracle node
//!
//! Loads configuration, starts the oracle and reports metrics until shutdown

use std::env;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use oracle_core::OracleConfig;
use oracle_price_feed::PriceOracle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_logging();

    info!("Starting price oracle v{}", env!("CARGO_PKG_VERSION"));

    let config_path = env::var("ORACLE_CONFIG").ok();
    let config = OracleConfig::load(config_path.as_deref())?;
    let report_interval = config.slow_interval();

    let oracle = PriceOracle::from_config(config)?;
    info!("Configured sources: {:?}", oracle.sources());

    oracle.start().await?;
    info!("Press Ctrl+C to shutdown");

    let mut report = tokio::time::interval(report_interval);
    report.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => {
                let metrics = oracle.get_metrics();
                match serde_json::to_string(&metrics) {
                    Ok(json) => info!("Metrics: {}", json),
                    Err(e) => error!("Failed to encode metrics: {}", e),
                }
            }
        }
    }

    oracle.stop().await;

    let metrics = oracle.get_metrics();
    info!(
        "Shutdown complete: {} requests, hit rate {:.2}, {} updates",
        metrics.total_requests,
        metrics.cache_hit_rate(),
        metrics.price_updates
    );
    Ok(())
}

/// `RUST_LOG` filter, defaulting to info. `LOG_FORMAT=json` for structured output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received termination signal"),
    }
}
