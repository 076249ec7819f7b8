use futures::future::join_all;
use log::{debug, warn};

use crate::config::NotifyConfig;
use crate::event::PipelineEvent;
use crate::slack::{ChatClient, ChatIdentity};

/// A notification target with its resolved chat identity.
///
/// Resolved fresh for every event; identities are never cached across
/// events.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub chat_id: String,
    pub display_name: String,
    #[allow(dead_code)]
    pub avatar_url: Option<String>,
}

/// Emails that should hear about this event: the committer always, the
/// approver when it is a distinct real address. Bot identities and (when a
/// whitelist is configured) unlisted addresses are dropped.
pub fn recipient_emails(event: &PipelineEvent, notify: &NotifyConfig) -> Vec<String> {
    let mut emails = Vec::new();

    if is_allowed(&event.committer_email, notify) {
        emails.push(event.committer_email.clone());
    }

    if let Some(approver) = &event.approved_by {
        // Auto-triggered stages record a literal marker ("changes"), not an
        // email address
        if approver.contains('@')
            && !approver.eq_ignore_ascii_case(&event.committer_email)
            && is_allowed(approver, notify)
        {
            emails.push(approver.clone());
        }
    }

    emails
}

fn is_allowed(email: &str, notify: &NotifyConfig) -> bool {
    if email.is_empty() {
        return false;
    }
    if notify
        .bot_emails
        .iter()
        .any(|bot| bot.eq_ignore_ascii_case(email))
    {
        debug!("Dropping bot identity {email}");
        return false;
    }
    if !notify.whitelist_emails.is_empty()
        && !notify
            .whitelist_emails
            .iter()
            .any(|listed| listed.eq_ignore_ascii_case(email))
    {
        debug!("{email} is not whitelisted, dropping");
        return false;
    }
    true
}

/// Resolve each email to a chat identity, independently and concurrently.
/// A failed or empty lookup drops that one recipient; the rest proceed.
pub async fn resolve(emails: &[String], chat: &impl ChatClient) -> Vec<Recipient> {
    let lookups = emails.iter().map(|email| chat.resolve_identity(email));
    let identities = join_all(lookups).await;

    emails
        .iter()
        .zip(identities)
        .filter_map(|(email, outcome)| match outcome {
            Ok(Some(identity)) => Some(to_recipient(email, identity)),
            Ok(None) => {
                debug!("No chat identity for {email}, dropping recipient");
                None
            }
            Err(err) => {
                warn!("Identity lookup failed for {email}: {err}");
                None
            }
        })
        .collect()
}

fn to_recipient(email: &str, identity: ChatIdentity) -> Recipient {
    Recipient {
        email: email.to_string(),
        chat_id: identity.id,
        display_name: identity.name,
        avatar_url: identity.avatar_url,
    }
}
