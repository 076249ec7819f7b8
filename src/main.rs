mod classifier;
mod cli;
mod config;
mod error;
mod event;
mod failures;
mod gocd;
mod handlers;
mod monitor;
mod notification;
mod recipients;
mod report;
mod server;
mod slack;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting Snitch - CI pipeline watchdog");
    cli.execute().await?;

    Ok(())
}
