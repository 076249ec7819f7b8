use log::{debug, info};
use serde::Deserialize;

use super::{ChatClient, ChatIdentity};
use crate::error::{Result, SnitchError};
use crate::notification::MessageDocument;

const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack Web API client.
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ok: bool,
    error: Option<String>,
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
struct SlackProfile {
    real_name: Option<String>,
    image_48: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

impl SlackClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_base_url(token, SLACK_API_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("snitch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SnitchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait::async_trait]
impl ChatClient for SlackClient {
    async fn resolve_identity(&self, email: &str) -> Result<Option<ChatIdentity>> {
        let url = format!("{}/users.lookupByEmail", self.base_url);
        let response: LookupResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("email", email)])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            let error = response.error.unwrap_or_else(|| "unknown".to_string());
            // Not being on Slack is a normal outcome, not a failure
            if error == "users_not_found" {
                debug!("No Slack user for {email}");
                return Ok(None);
            }
            return Err(SnitchError::Chat(error));
        }

        Ok(response.user.map(|user| {
            let profile = user.profile.unwrap_or(SlackProfile {
                real_name: None,
                image_48: None,
            });
            ChatIdentity {
                id: user.id,
                name: profile.real_name.unwrap_or(user.name),
                avatar_url: profile.image_48,
            }
        }))
    }

    async fn post_message(&self, channel: &str, document: &MessageDocument) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let body = serde_json::json!({
            "channel": channel,
            "text": document.text,
            "attachments": document.attachments,
        });

        let response: PostMessageResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(SnitchError::Chat(
                response.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        info!("Slack message sent to {channel}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_known_user() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail?email=ada%40example.com")
            .match_header("authorization", "Bearer xoxb-test")
            .with_body(
                r#"{"ok":true,"user":{"id":"U123","name":"ada","profile":{"real_name":"Ada Lovelace","image_48":"https://avatars.example.com/ada.png"}}}"#,
            )
            .create_async()
            .await;

        let client =
            SlackClient::with_base_url("xoxb-test".to_string(), server.url()).unwrap();
        let identity = client
            .resolve_identity("ada@example.com")
            .await
            .unwrap()
            .expect("user should resolve");

        assert_eq!(identity.id, "U123");
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(
            identity.avatar_url.as_deref(),
            Some("https://avatars.example.com/ada.png")
        );
    }

    #[tokio::test]
    async fn unknown_user_resolves_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail?email=ghost%40example.com")
            .with_body(r#"{"ok":false,"error":"users_not_found"}"#)
            .create_async()
            .await;

        let client =
            SlackClient::with_base_url("xoxb-test".to_string(), server.url()).unwrap();
        let identity = client.resolve_identity("ghost@example.com").await.unwrap();

        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn other_lookup_errors_propagate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail?email=ada%40example.com")
            .with_body(r#"{"ok":false,"error":"invalid_auth"}"#)
            .create_async()
            .await;

        let client =
            SlackClient::with_base_url("xoxb-test".to_string(), server.url()).unwrap();
        let err = client.resolve_identity("ada@example.com").await.unwrap_err();

        assert!(err.to_string().contains("invalid_auth"));
    }

    #[tokio::test]
    async fn post_message_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat.postMessage")
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;

        let client =
            SlackClient::with_base_url("xoxb-test".to_string(), server.url()).unwrap();
        let document = MessageDocument::plain("hello".to_string());
        let err = client.post_message("#nowhere", &document).await.unwrap_err();

        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn post_message_succeeds_on_ok() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client =
            SlackClient::with_base_url("xoxb-test".to_string(), server.url()).unwrap();
        let document = MessageDocument::plain("hello".to_string());
        client.post_message("#ci", &document).await.unwrap();

        mock.assert_async().await;
    }
}
