//! Messaging side of the service.
//!
//! The rest of the crate only sees [`MessageTransport`] for outgoing text and a
//! channel of [`InboundMessage`]s for commands; [`telegram`] provides both over the
//! Telegram Bot API.

pub mod telegram;

use thiserror::Error;

use crate::registry::ChatId;

pub use telegram::TelegramTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API rejected the request ({code}): {description}")]
    Api { code: i64, description: String },
}

/// A text message received from a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,

    /// Display name of the sender, for logging
    pub sender: String,

    pub text: String,
}

impl InboundMessage {
    pub fn new(chat_id: ChatId, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self { chat_id, sender: sender.into(), text: text.into() }
    }
}

/// Outgoing message delivery
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}
