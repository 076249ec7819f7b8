mod client;

use async_trait::async_trait;

pub use client::SlackClient;

use crate::error::Result;
use crate::notification::MessageDocument;

/// A resolved chat identity for a committer or approver email.
#[derive(Debug, Clone)]
pub struct ChatIdentity {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Operations the notification core needs from the chat workspace.
///
/// Dispatch is fire-and-forget: callers log failures and never retry, since
/// a retried delivery could duplicate an alert the team already saw.
#[async_trait]
pub trait ChatClient {
    /// Look up the chat identity for an email. Absent users resolve to
    /// `None`; only transport problems are errors.
    async fn resolve_identity(&self, email: &str) -> Result<Option<ChatIdentity>>;

    /// Post a message document to a channel or user id.
    async fn post_message(&self, channel: &str, document: &MessageDocument) -> Result<()>;
}
