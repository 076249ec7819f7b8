mod agent;
mod pipeline;

use log::{debug, error};
use serde_json::Value;

use crate::config::Config;
use crate::event::{AgentEvent, PipelineEvent};
use crate::gocd::CiServer;
use crate::slack::ChatClient;

/// Which handler a webhook body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pipeline,
    Agent,
}

/// Pick a handler by the shape of the body: a `pipeline` object routes to
/// the stage handler, the agent state pair routes to the agent handler.
pub fn route(body: &Value) -> Option<Route> {
    if body.get("pipeline").is_some() {
        return Some(Route::Pipeline);
    }
    if body.get("agent_state").is_some() && body.get("agent_config_state").is_some() {
        return Some(Route::Agent);
    }
    None
}

/// The webhook processing context: configuration plus the two collaborator
/// clients, shared read-only across requests.
pub struct Handlers<C, S> {
    pub config: Config,
    pub ci: C,
    pub chat: S,
}

impl<C, S> Handlers<C, S>
where
    C: CiServer + Send + Sync,
    S: ChatClient + Send + Sync,
{
    pub fn new(config: Config, ci: C, chat: S) -> Self {
        Self { config, ci, chat }
    }

    /// Process one webhook body to completion. Never fails: a bad or
    /// unprocessable event is logged and must not prevent the next one.
    pub async fn handle(&self, body: &Value) {
        match route(body) {
            Some(Route::Pipeline) => {
                let payload = &body["pipeline"];
                match PipelineEvent::decode(payload) {
                    Ok(event) => {
                        pipeline::handle(&event, &self.config, &self.ci, &self.chat).await;
                    }
                    Err(err) => error!("Ignoring undecodable pipeline event: {err}"),
                }
            }
            Some(Route::Agent) => {
                match serde_json::from_value::<AgentEvent>(body.clone()) {
                    Ok(event) => agent::handle(&event, &self.config, &self.chat).await,
                    Err(err) => error!("Ignoring undecodable agent event: {err}"),
                }
            }
            None => debug!("Unrecognized webhook body, ignoring"),
        }
    }
}
