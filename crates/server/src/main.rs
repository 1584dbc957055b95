use std::time::Duration;

use anyhow::Result;
use multireact_core::config::{AppConfig, LoadOptions};
use multireact_server::{bootstrap, health};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use multireact_core::config::LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before anything can log.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let health = health::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        health::HealthState::new(app.stores.buckets.clone()),
    )
    .await?;
    let sweeper = app.spawn_state_sweeper();

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        slash_command = %app.config.slack.slash_command,
        "multireact-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "multireact-server stopping"
    );

    sweeper.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, health.stop()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "health endpoint did not stop within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
