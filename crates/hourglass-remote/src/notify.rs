//! Chat notification sinks

use async_trait::async_trait;
use hourglass_config::NotifySettings;
use hourglass_host_api::{Notifier, NotifyError, NotifyResult};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Discord rejects message content longer than this (in characters)
pub const DISCORD_MAX_CONTENT: usize = 2000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the notifier selected by configuration
pub fn build_notifier(settings: &NotifySettings) -> NotifyResult<Arc<dyn Notifier>> {
    Ok(match settings {
        NotifySettings::DiscordBot { token, channel_id } => {
            Arc::new(DiscordNotifier::new(token.clone(), *channel_id)?)
        }
        NotifySettings::Webhook { url } => Arc::new(WebhookNotifier::new(url.clone())?),
        NotifySettings::Log => Arc::new(LogNotifier),
    })
}

fn http_client() -> NotifyResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| NotifyError::Request(e.to_string()))
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis
pub fn truncate_message(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

async fn post_json(request: reqwest::RequestBuilder, body: serde_json::Value) -> NotifyResult<()> {
    let response = request
        .header(CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .send()
        .await
        .map_err(|e| NotifyError::Request(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Notification rejected");
        Err(NotifyError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

/// Posts into one channel as a Discord bot
pub struct DiscordNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel_id: u64,
}

impl DiscordNotifier {
    pub fn new(token: String, channel_id: u64) -> NotifyResult<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: DISCORD_API_URL.to_string(),
            token,
            channel_id,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/channels/{}/messages",
            self.api_url.trim_end_matches('/'),
            self.channel_id
        )
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, text: &str) -> NotifyResult<()> {
        let content = truncate_message(text, DISCORD_MAX_CONTENT);
        let request = self
            .client
            .post(self.messages_url())
            .header(AUTHORIZATION, format!("Bot {}", self.token));
        post_json(request, serde_json::json!({ "content": content })).await
    }
}

/// Posts `{"content": ...}` to an incoming webhook (Discord, Slack-compatible)
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> NotifyResult<Self> {
        Ok(Self {
            client: http_client()?,
            url,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> NotifyResult<()> {
        let content = truncate_message(text, DISCORD_MAX_CONTENT);
        let request = self.client.post(&self.url);
        post_json(request, serde_json::json!({ "content": content })).await
    }
}

/// Writes notifications to the daemon log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> NotifyResult<()> {
        info!(message = %text, "Notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::serve_once;

    #[test]
    fn truncate_short_message_untouched() {
        assert_eq!(truncate_message("✅ Server started.", 2000), "✅ Server started.");
    }

    #[test]
    fn truncate_counts_characters() {
        let long = "é".repeat(2500);
        let cut = truncate_message(&long, DISCORD_MAX_CONTENT);
        assert_eq!(cut.chars().count(), DISCORD_MAX_CONTENT);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn messages_url() {
        let n = DiscordNotifier::new("t".into(), 123456789012345678).unwrap();
        assert_eq!(
            n.messages_url(),
            "https://discord.com/api/v10/channels/123456789012345678/messages"
        );
    }

    #[tokio::test]
    async fn discord_posts_as_bot() {
        let (base, captured) = serve_once(200, r#"{"id":"1"}"#).await;
        let n = DiscordNotifier::new("bot-token".into(), 42)
            .unwrap()
            .with_api_url(base);

        n.send("🟢 Starting server...").await.unwrap();

        let req = captured.await.unwrap();
        assert_eq!(req.request_line(), "POST /channels/42/messages HTTP/1.1");
        assert_eq!(req.header("authorization").as_deref(), Some("Bot bot-token"));
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body["content"], "🟢 Starting server...");
    }

    #[tokio::test]
    async fn discord_error_status() {
        let (base, _captured) = serve_once(403, r#"{"message":"Missing Access"}"#).await;
        let n = DiscordNotifier::new("t".into(), 1).unwrap().with_api_url(base);

        let result = n.send("hello").await;
        assert!(matches!(result, Err(NotifyError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn webhook_posts_content() {
        let (base, captured) = serve_once(204, "").await;
        let n = WebhookNotifier::new(format!("{}/hooks/abc", base)).unwrap();

        n.send("⏰ Server shutting down").await.unwrap();

        let req = captured.await.unwrap();
        assert_eq!(req.request_line(), "POST /hooks/abc HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body["content"], "⏰ Server shutting down");
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let n = build_notifier(&NotifySettings::Log).unwrap();
        assert!(n.send("anything").await.is_ok());
    }
}
