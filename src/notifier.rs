//! Downstream chat notification (§4.5/§6): a Telegram-shaped `sendMessage`
//! HTTP API behind a small trait, so the Dispatcher stays agnostic to the
//! wire format.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

/// Telegram Bot API client. Token and chat id come exclusively from
/// configuration; there is no built-in fallback.
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            chat_id,
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            anyhow::bail!("telegram sendMessage failed: {status} {details}");
        }
        Ok(())
    }
}

/// No-op notifier used when the Dispatcher is wired up without chat
/// credentials configured; logs instead of sending.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(text, "no notifier configured, dropping alert text");
        Ok(())
    }
}
