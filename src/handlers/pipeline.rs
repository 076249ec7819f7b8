use futures::future::join_all;
use log::{error, info};

use crate::classifier::{classify, Verdict};
use crate::config::Config;
use crate::event::PipelineEvent;
use crate::failures;
use crate::gocd::CiServer;
use crate::notification::PipelineNotification;
use crate::recipients;
use crate::slack::ChatClient;

/// Process one classified pipeline stage event end to end: classify,
/// aggregate failure evidence, resolve recipients, compose, and dispatch.
///
/// Every step is best-effort; nothing here can fail the webhook request.
pub async fn handle(
    event: &PipelineEvent,
    config: &Config,
    ci: &impl CiServer,
    chat: &impl ChatClient,
) {
    let fully_green = match classify(event, &config.notify, ci).await {
        Verdict::Notify { fully_green } => fully_green,
        Verdict::Suppress(reason) => {
            info!("Suppressing {} ({reason})", event.stage_uri());
            return;
        }
    };

    let failures = if fully_green {
        None
    } else {
        failures::aggregate(event, false, ci).await
    };

    let emails = recipients::recipient_emails(event, &config.notify);
    if emails.is_empty() {
        info!("No eligible recipients for {}", event.stage_uri());
        return;
    }

    let resolved = recipients::resolve(&emails, chat).await;
    if resolved.is_empty() {
        info!("No recipient resolved for {}", event.stage_uri());
        return;
    }

    let notification = PipelineNotification::new(event, fully_green, failures.as_ref(), config);
    let document = notification.compose();

    // Per-recipient delivery is independent; a failure for one recipient is
    // logged and never blocks the others
    let sends = resolved.iter().map(|recipient| {
        let document = &document;
        async move {
            info!("Notify {} ({})", recipient.display_name, recipient.chat_id);
            if let Err(err) = chat.post_message(&recipient.chat_id, document).await {
                error!("Failed to deliver to {}: {err}", recipient.email);
            }
        }
    });
    join_all(sends).await;
}
