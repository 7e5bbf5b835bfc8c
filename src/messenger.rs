//! Messaging channel that delivers announcements and settings replies.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::callback::CallbackPayload;
use crate::messenger::error::MessengerError;

pub mod error;
pub mod telegram;

/// A button that sends an encoded callback payload back when pressed.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, payload: &CallbackPayload) -> Self {
        Self {
            text: text.into(),
            callback_data: payload.encode(),
        }
    }
}

/// Rows of buttons attached below a message.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.inline_keyboard.push(buttons);
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a photo with an HTML caption.
    async fn send_photo(&self, chat_id: i64, photo: &Path, caption: &str) -> Result<(), MessengerError>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MessengerError>;

    /// Replaces the text and keyboard of a message sent earlier.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<(), MessengerError>;
}

/// Logs messages instead of sending them. Used when no messaging channel is
/// configured, e.g. for an ingestion-only process.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_photo(&self, chat_id: i64, photo: &Path, caption: &str) -> Result<(), MessengerError> {
        log::info!("[chat {chat_id}] photo {}: {caption}", photo.display());
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
        log::info!("[chat {chat_id}] {text}");
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        _keyboard: Option<InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        log::info!("[chat {chat_id}] edit {message_id}: {text}");
        Ok(())
    }
}
