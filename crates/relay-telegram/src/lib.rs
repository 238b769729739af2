//! Telegram adapter.
//!
//! Implements the `relay-core` ReplyPort over the Bot API `sendMessage`
//! method, parses webhook updates and serves the webhook router.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub mod router;
pub mod update;

use relay_core::{domain::ChatId, errors::Error, messaging::ReplyPort, Result};

/// Not `Debug`: the bot token is part of every request URL.
#[derive(Clone)]
pub struct TelegramSender {
    api_base: String,
    bot_token: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TelegramSender {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("reqwest client build: {e}")))?;
        Ok(Self {
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            http,
        })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

#[async_trait]
impl ReplyPort for TelegramSender {
    /// One attempt, no retry. The response body is returned as-is, whatever
    /// the status, so the caller can log it.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.send_message_url())
            .json(&SendMessage {
                chat_id: chat_id.0,
                text,
            })
            .send()
            .await
            .map_err(|e| Error::External(format!("telegram request error: {}", e.without_url())))?;

        resp.text()
            .await
            .map_err(|e| Error::External(format!("telegram response error: {}", e.without_url())))
    }
}
