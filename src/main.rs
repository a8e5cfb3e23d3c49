use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use logwarden::config::{LogFormat, LoggingConfig};
use logwarden::mongo::MongoStore;
use logwarden::{Runtime, SystemClock, WardenConfig};

fn init_logging(config: &LoggingConfig) {
    let level = tracing::Level::from(config.level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = WardenConfig::from_env().context("failed to load configuration")?;
    init_logging(&config.logging);

    info!("logwarden v{} starting", env!("CARGO_PKG_VERSION"));

    let Some(mongo) = config.mongo else {
        warn!("LOGGING_MONGODB_USE is not enabled, nothing to do");
        return Ok(());
    };

    let runtime = Runtime::new(&mongo, Arc::new(MongoStore), Arc::new(SystemClock));

    match runtime.run().await {
        Ok(true) => info!("Startup completed"),
        Ok(false) => {
            error!("Startup failed, see previous errors");
            return Ok(());
        }
        Err(e) => {
            error!(error = %e, "Startup failed");
            return Ok(());
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;
    Ok(())
}
