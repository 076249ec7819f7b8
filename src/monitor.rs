use std::sync::LazyLock;

use indexmap::IndexMap;
use log::{debug, error, info};
use regex::Regex;

use crate::config::Config;
use crate::error::{Result, SnitchError};
use crate::event::TICKET_RE;
use crate::gocd::{CiServer, HealthMessage};
use crate::notification::MessageDocument;
use crate::slack::ChatClient;

static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bBranch: (\S+)").unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in the last ([0-9]+) minute").unwrap());
static JOB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Job '(.*)' is not responding").unwrap());

/// Aggregated stuck-job evidence for one base pipeline, rebuilt from
/// scratch every poll cycle.
#[derive(Debug)]
pub struct StuckJobRecord {
    /// Warnings that aggregated under this pipeline this cycle
    pub count: usize,
    /// Waiting time reported by the first occurrence
    pub minutes: u64,
    /// Full job identifiers behind the count
    pub instances: Vec<String>,
}

#[derive(Debug)]
struct ParsedWarning {
    job_id: String,
    minutes: u64,
    ticket: Option<String>,
}

/// Polls the server health feed and raises one batched alert when jobs have
/// been waiting for an agent longer than the configured threshold.
pub struct StuckJobMonitor {
    threshold_minutes: u64,
    channel: String,
    skip_patterns: Vec<Regex>,
}

impl StuckJobMonitor {
    pub fn new(config: &Config) -> Result<Self> {
        let skip_patterns = config
            .monitor
            .skip_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    SnitchError::Config(format!("Invalid skip pattern {pattern:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            threshold_minutes: config.monitor.threshold_minutes,
            channel: config.slack.default_channel.clone(),
            skip_patterns,
        })
    }

    /// Run one poll cycle. Returns the number of pipelines that exceeded
    /// the threshold (and were included in the alert, if any).
    pub async fn check(&self, ci: &impl CiServer, chat: &impl ChatClient) -> Result<usize> {
        let warnings = ci.fetch_server_health().await?;
        if warnings.is_empty() {
            debug!("Server health is clean");
            return Ok(0);
        }
        info!("Found {} health warnings", warnings.len());

        let stuck = self.aggregate(&warnings);
        if stuck.is_empty() {
            return Ok(0);
        }
        for (name, record) in &stuck {
            debug!("{name}: {:?}", record.instances);
        }

        let document = MessageDocument::plain(summarize(&stuck));
        // One batched alert per cycle; a delivery failure is logged and the
        // cycle still counts as done
        if let Err(err) = chat.post_message(&self.channel, &document).await {
            error!("Failed to deliver stuck-job alert: {err}");
        }

        Ok(stuck.len())
    }

    fn aggregate(&self, warnings: &[HealthMessage]) -> IndexMap<String, StuckJobRecord> {
        let mut stuck: IndexMap<String, StuckJobRecord> = IndexMap::new();

        for info in warnings {
            if self
                .skip_patterns
                .iter()
                .any(|pattern| pattern.is_match(&info.message))
            {
                debug!("Skipped: {}", info.message);
                continue;
            }

            let Some(parsed) = parse_warning(info) else {
                debug!(
                    "Unparsed {} warning: {} / {}",
                    info.level, info.message, info.detail
                );
                continue;
            };

            if parsed.minutes <= self.threshold_minutes {
                continue;
            }

            info!(
                "{} Pipeline {} waiting for {} minutes",
                parsed.ticket.as_deref().unwrap_or("-"),
                parsed.job_id,
                parsed.minutes
            );

            let key = base_pipeline(&parsed.job_id).to_string();
            let record = stuck.entry(key).or_insert(StuckJobRecord {
                count: 0,
                minutes: parsed.minutes,
                instances: Vec::new(),
            });
            record.count += 1;
            record.instances.push(parsed.job_id);
        }

        stuck
    }
}

fn parse_warning(info: &HealthMessage) -> Option<ParsedWarning> {
    let job_id = JOB_RE
        .captures(&info.message)
        .map(|caps| caps[1].to_string())?;
    let minutes = DURATION_RE
        .captures(&info.detail)
        .and_then(|caps| caps[1].parse().ok())?;
    let ticket = TICKET_RE
        .find(&info.message)
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            BRANCH_RE
                .captures(&info.message)
                .map(|caps| caps[1].to_string())
        });

    Some(ParsedWarning {
        job_id,
        minutes,
        ticket,
    })
}

/// Pipeline identifier with any branch/suffix segment stripped, so the same
/// logical pipeline aggregates across branches.
fn base_pipeline(job_id: &str) -> &str {
    job_id.split('/').next().unwrap_or(job_id)
}

fn summarize(stuck: &IndexMap<String, StuckJobRecord>) -> String {
    let total_jobs: usize = stuck.values().map(|record| record.count).sum();
    let mut lines = vec![format!(
        ":warning: {} stuck jobs across {} pipelines",
        total_jobs,
        stuck.len()
    )];
    for (name, record) in stuck {
        lines.push(format!(
            "{} x {} waiting {} minutes",
            record.count, name, record.minutes
        ));
    }
    lines.join("\n")
}
