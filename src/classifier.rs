use log::{debug, warn};

use crate::config::NotifyConfig;
use crate::event::{PipelineEvent, StageResult, StageState};
use crate::gocd::CiServer;

/// Outcome of classifying a stage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Send a notification. `fully_green` selects the success composition:
    /// every stage of the pipeline instance has passed.
    Notify { fully_green: bool },
    Suppress(SuppressReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Merge-commit notifications are disabled by configuration
    MergeCommit,
    /// The server has not finished recording the stage result
    ResultUnknown,
    /// The previous run of this exact stage counter already passed; the
    /// failure-to-success transition was announced then
    AlreadyAnnounced,
    /// State/result combination that never notifies
    NotEligible,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SuppressReason::MergeCommit => "merge commit",
            SuppressReason::ResultUnknown => "result not recorded yet",
            SuppressReason::AlreadyAnnounced => "stage pass already announced",
            SuppressReason::NotEligible => "state/result not eligible",
        };
        write!(f, "{reason}")
    }
}

/// Decide whether a stage event warrants a notification.
///
/// Failure and cancellation always notify. A stage pass notifies when the
/// whole pipeline went green, or when there is no record of the immediately
/// preceding run (`counter - 1`) of the same stage having passed — if there
/// is, the team already heard about this stage and re-announcing every
/// intermediate pass is noise.
pub async fn classify(
    event: &PipelineEvent,
    notify: &NotifyConfig,
    ci: &impl CiServer,
) -> Verdict {
    if !notify.include_merge_commits && event.is_merge_commit() {
        debug!(
            "Merge commit by {}, skipping: {}",
            event.committer_name,
            event.subject_line()
        );
        return Verdict::Suppress(SuppressReason::MergeCommit);
    }

    if event.stage_result == StageResult::Unknown {
        return Verdict::Suppress(SuppressReason::ResultUnknown);
    }

    match (event.stage_state, event.stage_result) {
        (StageState::Failed, StageResult::Failed)
        | (StageState::Cancelled, StageResult::Cancelled) => {
            Verdict::Notify { fully_green: false }
        }
        (StageState::Passed, StageResult::Passed) => classify_stage_pass(event, ci).await,
        _ => Verdict::Suppress(SuppressReason::NotEligible),
    }
}

async fn classify_stage_pass(event: &PipelineEvent, ci: &impl CiServer) -> Verdict {
    match ci.is_pipeline_green(&event.display_name()).await {
        Ok(true) => return Verdict::Notify { fully_green: true },
        Ok(false) => {}
        // A failed lookup degrades to "not green"; the history check below
        // still decides whether the pass is worth announcing.
        Err(err) => warn!(
            "Could not check whether {} is green: {err}",
            event.display_name()
        ),
    }

    let history = match ci
        .fetch_stage_history(&event.pipeline_name, &event.stage_name)
        .await
    {
        Ok(history) => history,
        Err(err) => {
            warn!(
                "Could not fetch history for {}/{}: {err}",
                event.pipeline_name, event.stage_name
            );
            Vec::new()
        }
    };

    let previous_counter = event.stage_counter.saturating_sub(1);
    let previous_passed = previous_counter > 0
        && history.iter().any(|run| {
            run.counter == previous_counter && run.result == StageResult::Passed
        });

    if previous_passed {
        Verdict::Suppress(SuppressReason::AlreadyAnnounced)
    } else {
        Verdict::Notify { fully_green: false }
    }
}
