use anyhow::Result;
use fpl_ingestion::{etl, telemetry, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init(config.log_format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "FPL ingestion starting");

    // An aborted run has already been logged and still exits zero.
    etl::run_etl(&config).await?;
    Ok(())
}
