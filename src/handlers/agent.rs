use log::{debug, error, info};

use crate::config::Config;
use crate::event::{AgentEvent, AgentState, BuildState};
use crate::notification::agent_notification;
use crate::slack::ChatClient;

/// Log every agent status change; alert the default channel when a
/// deployment agent loses contact or comes back online.
pub async fn handle(event: &AgentEvent, config: &Config, chat: &impl ChatClient) {
    if !event.is_deploy_agent() {
        debug!("Ignoring non-deploy agent {}", event.host_name);
        return;
    }

    info!(
        "{} Status: {:?} State: {:?} Build State: {:?}",
        event.host_name, event.agent_config_state, event.agent_state, event.build_state
    );

    let text = if event.agent_state == AgentState::LostContact {
        format!("Agent *{}* in LostContact state", event.host_name)
    } else if event.agent_state == AgentState::Idle && event.build_state == BuildState::Idle {
        format!("*{}* has come back online", event.host_name)
    } else {
        return;
    };

    let document = agent_notification(event, &text, &config.gocd.base_url);
    if let Err(err) = chat
        .post_message(&config.slack.default_channel, &document)
        .await
    {
        error!("Failed to deliver agent alert: {err}");
    }
}
