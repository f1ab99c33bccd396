//! Loyalty ledger server binary
//!
//! Opens the ledger and runs the periodic expiry sweep until interrupted.

use anyhow::Context;
use loyalty_ledger::{config::LogFormat, Config, Ledger};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("LOYALTY_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("invalid LOYALTY_* environment")?,
    };

    init_tracing(config.log_format);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting loyalty ledger server"
    );

    let sweep_enabled = config.expiry.enabled;
    let mut sweep_timer = interval(Duration::from_secs(config.expiry.sweep_interval_secs.max(1)));
    sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ledger = Ledger::open(config).await.context("failed to open ledger")?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                break;
            }

            _ = sweep_timer.tick(), if sweep_enabled => {
                if let Err(e) = ledger.sweep_expired(chrono::Utc::now()).await {
                    tracing::error!(error = %e, "Expiry sweep failed");
                }

                match ledger.stats().await {
                    Ok(stats) => tracing::info!(
                        entries = stats.total_entries,
                        pending_expiries = stats.pending_expiries,
                        "Store statistics"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Failed to read store statistics"),
                }

                match ledger.metrics().render() {
                    Ok(text) => tracing::debug!(metrics = %text, "Metrics snapshot"),
                    Err(e) => tracing::warn!(error = %e, "Failed to render metrics"),
                }
            }
        }
    }

    tracing::info!("Shutting down loyalty ledger server");
    ledger.shutdown().await.context("failed to shut down ledger")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
