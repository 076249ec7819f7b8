use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::failures::parse_failures;
use crate::gocd::GoCdClient;
use crate::handlers::Handlers;
use crate::monitor::StuckJobMonitor;
use crate::notification::render_failure_details;
use crate::server;
use crate::slack::SlackClient;

#[derive(Parser)]
#[command(name = "snitch")]
#[command(author, version, about = "CI pipeline watchdog: GoCD events in, Slack alerts out", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive pipeline and agent webhooks and fan out notifications
    Serve {
        #[arg(short, long, default_value_t = 3000, env = "SNITCH_PORT")]
        port: u16,
    },

    /// Check the server health feed for stuck jobs
    Monitor {
        /// Keep checking on an interval instead of exiting after one pass
        #[arg(short, long, default_value_t = false)]
        watch: bool,

        /// Minutes between checks (defaults to the configured interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Print the detailed failure output of a stage's jobs
    Output {
        /// Stage URI, `pipeline/counter/stage/counter`
        stage_uri: String,

        /// Failed job names to inspect
        #[arg(required = true)]
        jobs: Vec<String>,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let token = config.slack_token().context(
            "Slack token missing: set slack.token or the SLACK_TOKEN environment variable",
        )?;
        let ci = GoCdClient::new(&config.gocd)?;
        let chat = SlackClient::new(token)?;

        match &self.command {
            Commands::Serve { port } => {
                let state = Arc::new(Handlers::new(config, ci, chat));
                server::serve(state, *port).await
            }
            Commands::Monitor { watch, interval } => {
                let monitor = StuckJobMonitor::new(&config)?;

                if !*watch {
                    let stuck = monitor.check(&ci, &chat).await?;
                    info!("Health check done, {stuck} pipelines stuck");
                    return Ok(());
                }

                let minutes = (*interval).unwrap_or(config.monitor.interval_minutes).max(1);
                info!("Starting health check loop, every {minutes} minutes");
                let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
                loop {
                    // First tick fires immediately, matching a manual check
                    ticker.tick().await;
                    if let Err(err) = monitor.check(&ci, &chat).await {
                        error!("Health check failed: {err}");
                    }
                }
            }
            Commands::Output { stage_uri, jobs } => {
                let parts: Vec<&str> = stage_uri.split('/').collect();
                let &[pipeline_name, pipeline_counter, stage_name, stage_counter] =
                    parts.as_slice()
                else {
                    anyhow::bail!("Stage URI must be pipeline/counter/stage/counter");
                };
                let pipeline = format!("{pipeline_name}/{pipeline_counter}");
                let stage = format!("{stage_name}/{stage_counter}");
                let names: Vec<&str> = jobs.iter().map(String::as_str).collect();

                match parse_failures(&pipeline, &stage, &names, true, &ci).await {
                    Some(failures) => println!("{}", render_failure_details(&failures)),
                    None => println!("No failure details found for {stage_uri}"),
                }
                Ok(())
            }
        }
    }
}
