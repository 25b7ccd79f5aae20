use anyhow::{Context, Result};
use evsolar::{ChargeDriver, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    evsolar::logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("evsolar {} starting up", env!("APP_VERSION"));

    let mut driver = ChargeDriver::from_config(&config).context("Failed to create driver")?;

    driver.run().await.context("Driver error")?;

    info!("evsolar shutdown complete");
    Ok(())
}
