//! Outbound messaging seam. Everything the core sends to the chat platform
//! goes through [`MessageGateway`]; the Telegram client implements it and tests
//! use a recording fake.

use async_trait::async_trait;
use ember_types::{ChatId, MessageId};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Telegram answers 400 "message is not modified" when an edit is a no-op.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::Api { description, .. } if description.contains("message is not modified"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self { rows: vec![buttons] }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub text: String,
    /// Send with HTML parse mode.
    pub html: bool,
    pub keyboard: Option<InlineKeyboard>,
    pub reply_to: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn plain(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            html: false,
            keyboard: None,
            reply_to: None,
        }
    }

    pub fn html(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            html: true,
            ..Self::plain(chat_id, text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn reply_to(mut self, message_id: Option<MessageId>) -> Self {
        self.reply_to = message_id;
        self
    }
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_message(&self, msg: OutgoingMessage) -> Result<MessageId, GatewayError>;

    /// Replace the text (HTML) of a message. Passing the keyboard keeps it attached.
    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), GatewayError>;

    async fn edit_message_reply_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &InlineKeyboard,
    ) -> Result<(), GatewayError>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), GatewayError>;

    /// Acknowledge a button press, optionally with a toast or an alert.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> Result<(), GatewayError>;
}
