// src/transport/mod.rs

//! Messaging transport boundary.
//!
//! The dispatcher talks to subscribers through the [`Messenger`] trait;
//! inbound traffic arrives as typed [`IncomingCommand`]s, decoupled from
//! any particular transport SDK's event representation.

pub mod telegram;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use telegram::TelegramTransport;

/// Per-message delivery options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Suppress link previews in the client
    pub disable_link_preview: bool,

    /// Render the message with rich-text markup
    pub rich_text: bool,
}

impl SendOptions {
    /// Options used for posting deliveries: no link preview, plain text.
    pub fn posting() -> Self {
        Self {
            disable_link_preview: true,
            rich_text: false,
        }
    }
}

/// Outbound messaging channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message to a channel address.
    async fn send(&self, address: &str, text: &str, opts: &SendOptions) -> Result<()>;
}

/// A parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCommand {
    /// Channel address the command arrived from
    pub channel_address: String,

    /// Command name without the leading slash, lowercased
    pub name: String,

    /// Whitespace-separated arguments after the command
    pub args: Vec<String>,
}

impl IncomingCommand {
    /// Parse command text of the form `/name arg1 arg2`.
    ///
    /// Returns `None` for anything that is not a slash command. A bot
    /// mention suffix (`/name@some_bot`) is stripped.
    pub fn parse(channel_address: impl Into<String>, text: &str) -> Option<Self> {
        let mut tokens = text.trim().split_whitespace();
        let head = tokens.next()?;
        let name = head.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        if name.is_empty() {
            return None;
        }

        Some(Self {
            channel_address: channel_address.into(),
            name: name.to_lowercase(),
            args: tokens.map(str::to_string).collect(),
        })
    }
}
