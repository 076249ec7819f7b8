use std::collections::BTreeSet;
use std::path::Path;

use futures::future::join_all;
use log::{debug, warn};

use crate::event::PipelineEvent;
use crate::gocd::CiServer;
use crate::report::{parse_report, TestCase, TestReport};

/// Above this many failed jobs the notification falls back to listing job
/// names only; fetching and rendering dozens of reports produces unreadable
/// alerts.
pub const MAX_AGGREGATED_JOBS: usize = 10;

/// How many lines of a failure message detail mode renders per test case.
const DETAIL_MESSAGE_LINES: usize = 5;

/// Collect a deduplicated failure summary from the test reports of the
/// event's failed jobs.
///
/// Reports are fetched concurrently; a fetch failure or malformed report
/// drops that one job's evidence and never aborts the batch. Returns `None`
/// when the failed-job count is outside `1..=MAX_AGGREGATED_JOBS` or no
/// report yielded anything.
pub async fn aggregate(
    event: &PipelineEvent,
    detail: bool,
    ci: &impl CiServer,
) -> Option<BTreeSet<String>> {
    let failed = event.failed_jobs();
    if failed.is_empty() || failed.len() > MAX_AGGREGATED_JOBS {
        return None;
    }

    let names: Vec<&str> = failed.iter().map(|job| job.name.as_str()).collect();
    parse_failures(
        &event.display_name(),
        &event.stage_display(),
        &names,
        detail,
        ci,
    )
    .await
}

/// Fetch and parse the test reports of the named jobs directly by stage
/// coordinates (`name/counter` pairs), as the "show full output" flow does.
pub async fn parse_failures(
    pipeline: &str,
    stage: &str,
    jobs: &[&str],
    detail: bool,
    ci: &impl CiServer,
) -> Option<BTreeSet<String>> {
    let fetches = jobs
        .iter()
        .map(|job| ci.fetch_job_test_report(pipeline, stage, job));
    let outcomes = join_all(fetches).await;

    let mut descriptors = BTreeSet::new();
    for (job, outcome) in jobs.iter().zip(outcomes) {
        let xml = match outcome {
            Ok(Some(xml)) => xml,
            Ok(None) => {
                debug!("No test report for job {job}");
                continue;
            }
            Err(err) => {
                warn!("Failed to fetch test report for job {job}: {err}");
                continue;
            }
        };

        match parse_report(&xml) {
            Ok(report) => collect_descriptors(&report, detail, &mut descriptors),
            Err(err) => warn!("Skipping malformed report for job {job}: {err}"),
        }
    }

    if descriptors.is_empty() {
        None
    } else {
        Some(descriptors)
    }
}

fn collect_descriptors(report: &TestReport, detail: bool, out: &mut BTreeSet<String>) {
    for suite in report.suites.iter().filter(|suite| suite.has_problems()) {
        for case in suite.cases.iter().filter(|case| case.is_problem()) {
            out.insert(describe_case(case, detail));
        }
    }
}

/// One descriptor per failing case: `file:line` plus the test name, the
/// failure message in detail mode, or whatever identification the report
/// carries.
fn describe_case(case: &TestCase, detail: bool) -> String {
    if let Some(file) = &case.file {
        let location = format!("{}:{}", basename(file), case.line.unwrap_or(0));
        if detail {
            if let Some(problem) = case.first_problem() {
                let message = problem.rendered_message();
                if !message.is_empty() {
                    let mut text = format!("{location}\n");
                    for line in message.lines().take(DETAIL_MESSAGE_LINES) {
                        text.push_str("  ");
                        text.push_str(line);
                        text.push('\n');
                    }
                    return text;
                }
            }
        }
        return format!("{location}\n  {}\n", case.name);
    }

    if let Some(classname) = &case.classname {
        return classname.clone();
    }

    case.first_problem()
        .map(|problem| problem.rendered_message())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| case.name.clone())
}

fn basename(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file)
}
