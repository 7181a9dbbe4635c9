use chrono::Local;
use clap::Parser;
use imslp_harvest::{config::Config, info_time, process::run, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let default_filter = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let start_time = Local::now();
    let summary = run(config).await?;
    info_time!(start_time, "Full program time: {}", summary);

    Ok(())
}
