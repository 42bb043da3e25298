//! Notification delivery for alerts

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::{NotifierConfig, NotifierKind};
use crate::error::{Error, Result};
use crate::models::NotificationRecord;

/// Delivers alert text to a channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel type, for records and logs
    fn channel(&self) -> &'static str;

    /// Deliver `text`
    async fn send(&self, text: &str) -> Result<()>;
}

/// Result of sending a notification
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// Channel that attempted delivery
    pub channel_type: String,
    /// Whether the channel accepted the message
    pub success: bool,
    /// Failure detail when `success` is false
    pub error: Option<String>,
    /// When delivery was attempted
    pub sent_at: DateTime<Utc>,
}

impl From<NotificationResult> for NotificationRecord {
    fn from(result: NotificationResult) -> Self {
        NotificationRecord {
            channel_type: result.channel_type,
            sent_at: result.sent_at,
            success: result.success,
            error: result.error,
        }
    }
}

/// Build the configured notifier
pub fn build_notifier(config: &NotifierConfig, timeout: Duration) -> Result<Arc<dyn Notifier>> {
    let client = || Client::builder().timeout(timeout).build();

    let notifier: Arc<dyn Notifier> = match config.kind {
        NotifierKind::Telegram => {
            let (Some(token), Some(chat_id)) = (&config.bot_token, &config.chat_id) else {
                return Err(Error::config(
                    "notifier.bot_token and notifier.chat_id are required for telegram",
                ));
            };
            Arc::new(TelegramNotifier::new(client()?, &config.api_base, token, chat_id))
        }
        NotifierKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                Error::config("notifier.webhook_url is required for the webhook channel")
            })?;
            Arc::new(WebhookNotifier::new(client()?, url))
        }
        NotifierKind::Log => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

/// Sends through a Telegram bot's `sendMessage`
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a Telegram notifier
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        );
        let payload = TelegramPayload {
            chat_id: &self.chat_id,
            text,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::upstream("telegram", e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "telegram",
                format!("Telegram returned {}: {}", status, body),
            ));
        }

        info!(chat_id = %self.chat_id, "Telegram notification sent");
        Ok(())
    }
}

/// Posts a JSON body to an arbitrary webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let payload = WebhookPayload {
            source: "gatewatch",
            text,
            sent_at: Utc::now(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::upstream("webhook", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "webhook",
                format!("Webhook returned {}: {}", status, body),
            ));
        }

        info!(url = %self.url, "Webhook notification sent");
        Ok(())
    }
}

/// Writes alerts to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn send(&self, text: &str) -> Result<()> {
        info!(message = %text, "Alert (log channel)");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    source: &'static str,
    text: &'a str,
    sent_at: DateTime<Utc>,
}
