use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::event::{AgentEvent, AgentState, BuildState, PipelineEvent, StageState};
use crate::failures::MAX_AGGREGATED_JOBS;

const COLOR_WARNING: &str = "#ffc03d";
const COLOR_ERROR: &str = "#ff5a5a";
const COLOR_SUCCESS: &str = "#27ce70";
const COLOR_SUCCESS_BRIGHT: &str = "#00ff7f";
const COLOR_NEUTRAL: &str = "#1352c6";

/// At most this many job links are listed; beyond it the field states the
/// overage count instead.
const MAX_LISTED_JOBS: usize = 10;

/// The rerun action disappears once this many jobs failed; a rerun of that
/// much of the pipeline is a rebuild, not a retry.
const MAX_RERUNNABLE_JOBS: usize = 20;

/// A chat message: plain text, structured attachments, or both.
#[derive(Debug, Default, Serialize)]
pub struct MessageDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mrkdwn_in: Vec<&'static str>,
    pub color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Unix timestamp rendered next to the footer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

#[derive(Debug, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Serialize)]
pub struct Action {
    pub name: &'static str,
    pub text: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: String,
}

impl MessageDocument {
    pub fn plain(text: String) -> Self {
        Self {
            text: Some(text),
            attachments: Vec::new(),
        }
    }
}

/// Builds the per-recipient alert for a classified pipeline event.
pub struct PipelineNotification<'a> {
    event: &'a PipelineEvent,
    fully_green: bool,
    failures: Option<&'a BTreeSet<String>>,
    config: &'a Config,
}

impl<'a> PipelineNotification<'a> {
    pub fn new(
        event: &'a PipelineEvent,
        fully_green: bool,
        failures: Option<&'a BTreeSet<String>>,
        config: &'a Config,
    ) -> Self {
        Self {
            event,
            fully_green,
            failures,
            config,
        }
    }

    pub fn compose(&self) -> MessageDocument {
        let event = self.event;

        MessageDocument {
            text: None,
            attachments: vec![Attachment {
                mrkdwn_in: vec!["pretext"],
                color: self.color(),
                pretext: Some(self.pretext()),
                author_name: Some(event.committer_name.clone()),
                author_icon: Some(event.committer_avatar_url()),
                title: Some(format!("{} {}", event.commit_hash, event.subject_line())),
                title_link: event.commit_url(),
                text: self.failure_summary(),
                fields: self.fields(),
                footer: Some(format!("Status: {}", event.stage_result)),
                ts: Some(Utc::now().timestamp()),
                callback_id: Some("build_response"),
                actions: self.actions(),
            }],
        }
    }

    fn color(&self) -> &'static str {
        match self.event.stage_state {
            StageState::Cancelled => COLOR_WARNING,
            StageState::Failed => COLOR_ERROR,
            StageState::Passed if self.fully_green => COLOR_SUCCESS_BRIGHT,
            StageState::Passed => COLOR_SUCCESS,
            _ => COLOR_NEUTRAL,
        }
    }

    fn pretext(&self) -> String {
        let event = self.event;
        let jobs_url = event.jobs_url(&self.config.gocd.base_url);
        let state_line = if self.fully_green {
            format!("Pipeline fully green <{jobs_url}|{}>", event.stage_uri())
        } else {
            format!(
                "Pipeline stage {} <{jobs_url}|{}>",
                event.stage_state.verb(),
                event.stage_uri()
            )
        };

        match (event.ticket_number(), &self.config.notify.jira_url) {
            (Some(ticket), Some(jira)) => {
                format!("<{jira}/browse/{ticket}|{ticket}> {state_line}")
            }
            (Some(ticket), None) => format!("{ticket} {state_line}"),
            (None, _) => state_line,
        }
    }

    fn fields(&self) -> Vec<Field> {
        let event = self.event;
        let mut fields = vec![
            Field {
                title: "Pipeline".to_string(),
                value: event.display_name(),
                short: true,
            },
            Field {
                title: "Stage".to_string(),
                value: event.stage_display(),
                short: true,
            },
        ];

        if let Some(ticket) = event.ticket_number() {
            let value = match &self.config.notify.jira_url {
                Some(jira) => format!("<{jira}/browse/{ticket}|{ticket}>"),
                None => ticket,
            };
            fields.push(Field {
                title: "JIRA".to_string(),
                value,
                short: true,
            });
        }

        if let Some(field) = self.failed_jobs_field() {
            fields.push(field);
        }

        fields
    }

    fn failed_jobs_field(&self) -> Option<Field> {
        let failed = self.event.failed_jobs();
        if failed.is_empty() {
            return None;
        }

        let mut lines: Vec<String> = failed
            .iter()
            .take(MAX_LISTED_JOBS)
            .map(|job| {
                format!(
                    "<{}|{}>",
                    self.event.job_url(&self.config.gocd.base_url, &job.name),
                    job.name
                )
            })
            .collect();
        if failed.len() > MAX_LISTED_JOBS {
            lines.push(format!("... and {} more", failed.len() - MAX_LISTED_JOBS));
        }

        Some(Field {
            title: format!("Failed Jobs ({})", failed.len()),
            value: lines.join("\n"),
            short: false,
        })
    }

    fn failure_summary(&self) -> Option<String> {
        let failures = self.failures?;
        if failures.is_empty() {
            return None;
        }
        let body: Vec<&str> = failures
            .iter()
            .map(|descriptor| descriptor.trim_end())
            .collect();
        Some(format!("```\n{}\n```", body.join("\n")))
    }

    fn actions(&self) -> Vec<Action> {
        let event = self.event;
        let failed = event.failed_jobs();
        let mut actions = Vec::new();

        // Gate the rerun on the stage counter so a stuck stage cannot be
        // re-triggered forever through repeated clicking
        if !failed.is_empty()
            && failed.len() < MAX_RERUNNABLE_JOBS
            && event.stage_counter < self.config.notify.max_stage_reruns
        {
            let payload = serde_json::json!({
                "uri": event.stage_uri(),
                "name": event.display_name(),
            });
            actions.push(Action {
                name: "rerun",
                text: "Rerun Failed Jobs",
                kind: "button",
                value: payload.to_string(),
            });
        }

        // Above the aggregation cap the message is already truncated, so
        // there is no full output to show
        if !failed.is_empty() && failed.len() < MAX_AGGREGATED_JOBS {
            let payload = serde_json::json!({
                "name": event.display_name(),
                "pipeline": event.pipeline_name,
                "stage": event.stage_name,
                "counter": event.stage_counter,
                "jobs": failed.iter().map(|job| job.name.clone()).collect::<Vec<_>>(),
            });
            actions.push(Action {
                name: "output",
                text: "Show Full Output",
                kind: "button",
                value: payload.to_string(),
            });
        }

        actions
    }
}

/// Follow-up rendering for the "show full output" action: one fenced block
/// per failure, empty lines trimmed.
pub fn render_failure_details(failures: &BTreeSet<String>) -> String {
    failures
        .iter()
        .map(|failure| {
            let cleaned: Vec<&str> = failure
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect();
            format!("```{}``` ", cleaned.join("\n"))
        })
        .collect()
}

/// Alert for a deployment agent status change.
pub fn agent_notification(agent: &AgentEvent, text: &str, base_url: &str) -> MessageDocument {
    MessageDocument {
        text: Some(text.to_string()),
        attachments: vec![Attachment {
            mrkdwn_in: vec!["text", "title", "pretext"],
            color: agent_color(agent),
            title: Some(text.to_string()),
            title_link: Some(format!(
                "{}/go/agents/{}/job_run_history",
                base_url, agent.uuid
            )),
            text: Some(format!(
                "Agent State: {:?} Build State: {:?}",
                agent.agent_state, agent.build_state
            )),
            footer: Some(format!("Agent UUID: {}", agent.uuid)),
            ts: Some(Utc::now().timestamp()),
            ..Attachment::default()
        }],
    }
}

fn agent_color(agent: &AgentEvent) -> &'static str {
    if agent.agent_state == AgentState::LostContact {
        return COLOR_ERROR;
    }
    if agent.agent_state == AgentState::Idle && agent.build_state == BuildState::Idle {
        return COLOR_SUCCESS_BRIGHT;
    }
    if agent.agent_state == AgentState::Building || agent.build_state == BuildState::Building {
        return COLOR_SUCCESS;
    }
    COLOR_NEUTRAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_jobs(state: &str, result: &str, failed: usize, passed: usize) -> PipelineEvent {
        let mut jobs: Vec<serde_json::Value> = (0..failed)
            .map(|i| json!({"name": format!("job-{i}"), "result": "Failed"}))
            .collect();
        jobs.extend((0..passed).map(|i| json!({"name": format!("ok-{i}"), "result": "Passed"})));

        PipelineEvent::decode(&json!({
            "name": "checkout-service",
            "counter": "42",
            "stage": {
                "name": "integration",
                "counter": "1",
                "state": state,
                "result": result,
                "jobs": jobs
            },
            "build-cause": [{
                "material": {
                    "git-configuration": {"url": "https://github.com/example/checkout.git"}
                },
                "modifications": [{
                    "revision": "a1b2c3d4e5",
                    "data": {
                        "committerName": "Ada Lovelace",
                        "committerEmail": "ada@example.com",
                        "subject": "XO-123 Fix rounding"
                    }
                }]
            }]
        }))
        .unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.notify.jira_url = Some("https://jira.example.com".to_string());
        config
    }

    #[cfg(test)]
    mod colors {
        use super::*;

        fn color_of(state: &str, result: &str, fully_green: bool) -> &'static str {
            let event = event_with_jobs(state, result, 0, 1);
            let config = config();
            let notification = PipelineNotification::new(&event, fully_green, None, &config);
            notification.color()
        }

        #[test]
        fn maps_states_to_colors() {
            assert_eq!(color_of("Cancelled", "Cancelled", false), COLOR_WARNING);
            assert_eq!(color_of("Failed", "Failed", false), COLOR_ERROR);
            assert_eq!(color_of("Passed", "Passed", false), COLOR_SUCCESS);
            assert_eq!(color_of("Passed", "Passed", true), COLOR_SUCCESS_BRIGHT);
            assert_eq!(color_of("Building", "Unknown", false), COLOR_NEUTRAL);
        }
    }

    #[cfg(test)]
    mod pretexts {
        use super::*;

        #[test]
        fn links_the_ticket_when_matched() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            let config = config();
            let notification = PipelineNotification::new(&event, false, None, &config);

            let pretext = notification.pretext();
            assert!(
                pretext.starts_with("<https://jira.example.com/browse/XO-123|XO-123>"),
                "Got: {pretext}"
            );
            assert!(pretext.contains("Pipeline stage failed"));
        }

        #[test]
        fn omits_the_ticket_when_absent() {
            let mut event = event_with_jobs("Failed", "Failed", 1, 0);
            event.commit_subject = "Fix rounding".to_string();
            let config = config();
            let notification = PipelineNotification::new(&event, false, None, &config);

            let pretext = notification.pretext();
            assert!(pretext.starts_with("Pipeline stage failed"), "Got: {pretext}");
        }

        #[test]
        fn fully_green_gets_its_own_wording() {
            let event = event_with_jobs("Passed", "Passed", 0, 2);
            let config = config();
            let notification = PipelineNotification::new(&event, true, None, &config);

            assert!(notification.pretext().contains("Pipeline fully green"));
        }
    }

    #[cfg(test)]
    mod failed_job_fields {
        use super::*;

        #[test]
        fn lists_each_failed_job_with_a_link() {
            let event = event_with_jobs("Failed", "Failed", 1, 1);
            let config = config();
            let notification = PipelineNotification::new(&event, false, None, &config);

            let field = notification.failed_jobs_field().unwrap();
            assert_eq!(field.title, "Failed Jobs (1)");
            assert!(field.value.contains("job-0"));
            assert!(field.value.contains("/go/tab/build/detail/"));
        }

        #[test]
        fn caps_the_listing_and_states_the_overage() {
            let event = event_with_jobs("Failed", "Failed", 12, 0);
            let config = config();
            let notification = PipelineNotification::new(&event, false, None, &config);

            let field = notification.failed_jobs_field().unwrap();
            assert_eq!(field.title, "Failed Jobs (12)");
            assert_eq!(field.value.matches("<").count(), 10, "Only 10 links");
            assert!(field.value.ends_with("... and 2 more"));
        }

        #[test]
        fn no_field_without_failed_jobs() {
            let event = event_with_jobs("Passed", "Passed", 0, 2);
            let config = config();
            let notification = PipelineNotification::new(&event, false, None, &config);
            assert!(notification.failed_jobs_field().is_none());
        }
    }

    #[cfg(test)]
    mod actions {
        use super::*;

        fn action_names(event: &PipelineEvent, config: &Config) -> Vec<&'static str> {
            PipelineNotification::new(event, false, None, config)
                .actions()
                .iter()
                .map(|action| action.name)
                .collect()
        }

        #[test]
        fn rerun_and_output_for_a_small_failure() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            assert_eq!(action_names(&event, &config()), vec!["rerun", "output"]);
        }

        #[test]
        fn no_actions_without_failed_jobs() {
            let event = event_with_jobs("Passed", "Passed", 0, 2);
            assert!(action_names(&event, &config()).is_empty());
        }

        #[test]
        fn rerun_disappears_at_twenty_failed_jobs() {
            let event = event_with_jobs("Failed", "Failed", 20, 0);
            assert!(
                !action_names(&event, &config()).contains(&"rerun"),
                "20 failed jobs must not offer a rerun"
            );
        }

        #[test]
        fn nineteen_failed_jobs_still_offer_a_rerun() {
            let event = event_with_jobs("Failed", "Failed", 19, 0);
            assert!(action_names(&event, &config()).contains(&"rerun"));
        }

        #[test]
        fn rerun_disappears_after_too_many_stage_runs() {
            let mut event = event_with_jobs("Failed", "Failed", 1, 0);
            event.stage_counter = 3; // config default max-stage-reruns = 3
            assert!(!action_names(&event, &config()).contains(&"rerun"));
        }

        #[test]
        fn output_disappears_at_the_detail_limit() {
            let event = event_with_jobs("Failed", "Failed", 10, 0);
            assert!(!action_names(&event, &config()).contains(&"output"));

            let event = event_with_jobs("Failed", "Failed", 9, 0);
            assert!(action_names(&event, &config()).contains(&"output"));
        }

        #[test]
        fn rerun_payload_carries_the_stage_uri() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            let config = config();
            let actions = PipelineNotification::new(&event, false, None, &config).actions();

            let payload: serde_json::Value =
                serde_json::from_str(&actions[0].value).unwrap();
            assert_eq!(payload["uri"], "checkout-service/42/integration/1");
        }
    }

    #[cfg(test)]
    mod documents {
        use super::*;
        use std::collections::BTreeSet;

        #[test]
        fn compose_includes_commit_summary_and_footer() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            let config = config();
            let document =
                PipelineNotification::new(&event, false, None, &config).compose();

            let attachment = &document.attachments[0];
            assert_eq!(
                attachment.title.as_deref(),
                Some("a1b2c3d XO-123 Fix rounding")
            );
            assert_eq!(
                attachment.title_link.as_deref(),
                Some("https://github.com/example/checkout/commit/a1b2c3d")
            );
            assert_eq!(attachment.footer.as_deref(), Some("Status: Failed"));
            assert_eq!(attachment.callback_id, Some("build_response"));
        }

        #[test]
        fn failure_set_renders_as_a_code_block() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            let config = config();
            let failures: BTreeSet<String> =
                ["a.js:10\n  t1\n".to_string()].into_iter().collect();
            let document =
                PipelineNotification::new(&event, false, Some(&failures), &config).compose();

            let text = document.attachments[0].text.as_deref().unwrap();
            assert_eq!(text, "```\na.js:10\n  t1\n```");
        }

        #[test]
        fn serializes_with_slack_field_names() {
            let event = event_with_jobs("Failed", "Failed", 1, 0);
            let config = config();
            let document =
                PipelineNotification::new(&event, false, None, &config).compose();

            let value = serde_json::to_value(&document).unwrap();
            let attachment = &value["attachments"][0];
            assert_eq!(attachment["mrkdwn_in"][0], "pretext");
            assert_eq!(attachment["actions"][0]["type"], "button");
            assert!(attachment.get("text").is_none(), "No failures, no text");
        }
    }

    #[cfg(test)]
    mod details {
        use super::*;
        use std::collections::BTreeSet;

        #[test]
        fn render_trims_empty_lines_and_fences_each_failure() {
            let failures: BTreeSet<String> = [
                "a.js:10\n\n  t1\n".to_string(),
                "b.js:20\n  t2\n".to_string(),
            ]
            .into_iter()
            .collect();

            let rendered = render_failure_details(&failures);
            assert_eq!(rendered, "```a.js:10\n  t1``` ```b.js:20\n  t2``` ");
        }
    }

    #[cfg(test)]
    mod agents {
        use super::*;
        use crate::event::AgentEvent;

        fn agent(agent_state: &str, build_state: &str) -> AgentEvent {
            serde_json::from_value(json!({
                "host_name": "deploy-box-1",
                "is_elastic": false,
                "uuid": "0f1e2d3c",
                "agent_config_state": "Enabled",
                "agent_state": agent_state,
                "build_state": build_state
            }))
            .unwrap()
        }

        #[test]
        fn lost_contact_is_an_error_color() {
            let document = agent_notification(
                &agent("LostContact", "Unknown"),
                "Agent *deploy-box-1* in LostContact state",
                "https://ci.example.com",
            );
            assert_eq!(document.attachments[0].color, COLOR_ERROR);
        }

        #[test]
        fn idle_idle_is_bright_green() {
            let document = agent_notification(
                &agent("Idle", "Idle"),
                "*deploy-box-1* has come back online",
                "https://ci.example.com",
            );
            let attachment = &document.attachments[0];
            assert_eq!(attachment.color, COLOR_SUCCESS_BRIGHT);
            assert_eq!(
                attachment.title_link.as_deref(),
                Some("https://ci.example.com/go/agents/0f1e2d3c/job_run_history")
            );
            assert_eq!(attachment.footer.as_deref(), Some("Agent UUID: 0f1e2d3c"));
        }
    }
}
