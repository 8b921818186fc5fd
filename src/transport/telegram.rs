// src/transport/telegram.rs

//! Telegram Bot API transport.
//!
//! Drives the Bot API directly over reqwest: `sendMessage` for outbound
//! delivery and `getUpdates` long polling for inbound commands.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::TelegramConfig;
use crate::transport::{IncomingCommand, Messenger, SendOptions};

/// Telegram Bot API client.
pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: AtomicI64,
    running: AtomicBool,
}

impl TelegramTransport {
    /// Create a transport from configuration.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(AppError::config("telegram.bot_token is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            config,
            client,
            last_update_id: AtomicI64::new(0),
            running: AtomicBool::new(true),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Verify the token by fetching bot identity.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self.client.get(self.api_url("getMe")).send().await?;
        let body: ApiResponse<TelegramUser> = response.json().await?;
        body.into_result()
    }

    /// Fetch pending updates via long polling.
    pub async fn get_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let offset = self.last_update_id.load(Ordering::SeqCst) + 1;
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.config.poll_timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await?;

        let body: ApiResponse<Vec<TelegramUpdate>> = response.json().await?;
        let updates = body.into_result()?;

        if let Some(last) = updates.last() {
            self.last_update_id.store(last.update_id, Ordering::SeqCst);
        }
        Ok(updates)
    }

    /// Poll for commands until [`stop_receiving`] is called.
    ///
    /// Each parsed command is handed to `handler`; handler failures are
    /// logged and never end the loop.
    ///
    /// [`stop_receiving`]: Self::stop_receiving
    pub async fn run_polling<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(IncomingCommand) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let me = self.get_me().await?;
        log::info!(
            "Telegram bot @{} polling for commands",
            me.username.as_deref().unwrap_or("unknown")
        );

        while self.running.load(Ordering::SeqCst) {
            match self.get_updates().await {
                Ok(updates) => {
                    for update in updates {
                        if let Some(command) = update.to_command() {
                            if let Err(e) = handler(command).await {
                                log::error!("Command handler failed: {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Polling error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }

        log::info!("Telegram polling stopped");
        Ok(())
    }

    /// Signal the polling loop to exit after the current round.
    pub fn stop_receiving(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Messenger for TelegramTransport {
    async fn send(&self, address: &str, text: &str, opts: &SendOptions) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": address,
            "text": text,
            "disable_web_page_preview": opts.disable_link_preview,
        });
        if opts.rich_text {
            body["parse_mode"] = "HTML".into();
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        let result: ApiResponse<serde_json::Value> = response.json().await?;
        result.into_result()?;
        Ok(())
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T> {
        if !self.ok {
            return Err(AppError::transport(format!(
                "Telegram API error: {}",
                self.description.unwrap_or_default()
            )));
        }
        self.result
            .ok_or_else(|| AppError::transport("Telegram API returned an empty result"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub username: Option<String>,
}

impl TelegramUpdate {
    /// Convert an update into a parsed command, if it carries one.
    pub fn to_command(&self) -> Option<IncomingCommand> {
        let message = self.message.as_ref()?;
        let text = message.text.as_ref()?;

        // Ignore traffic from other bots.
        if message.from.as_ref().is_some_and(|u| u.is_bot) {
            return None;
        }

        IncomingCommand::parse(message.chat.id.to_string(), text)
    }
}
