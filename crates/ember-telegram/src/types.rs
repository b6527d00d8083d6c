//! Bot API wire types. Only the fields the bot reads are modelled; unknown
//! fields are ignored by serde.

use ember_core::{InlineKeyboard, OutgoingMessage};
use ember_types::{ChatId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    pub fn is_private(&self) -> bool {
        self.chat.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ButtonBody<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplyMarkup<'a> {
    inline_keyboard: Vec<Vec<ButtonBody<'a>>>,
}

impl<'a> From<&'a InlineKeyboard> for ReplyMarkup<'a> {
    fn from(kb: &'a InlineKeyboard) -> Self {
        Self {
            inline_keyboard: kb
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| ButtonBody {
                            text: &b.text,
                            callback_data: &b.callback_data,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplyParameters {
    message_id: MessageId,
    /// Still deliver if the quoted message was deleted.
    allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageBody<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
    disable_web_page_preview: bool,
}

impl<'a> From<&'a OutgoingMessage> for SendMessageBody<'a> {
    fn from(msg: &'a OutgoingMessage) -> Self {
        Self {
            chat_id: msg.chat_id,
            text: &msg.text,
            parse_mode: msg.html.then_some("HTML"),
            reply_markup: msg.keyboard.as_ref().map(ReplyMarkup::from),
            reply_parameters: msg.reply_to.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
            disable_web_page_preview: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EditTextBody<'a> {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: &'a str,
    pub parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<ReplyMarkup<'a>>,
    pub disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditMarkupBody<'a> {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub reply_markup: ReplyMarkup<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

pub(crate) const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesBody {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerCallbackBody<'a> {
    pub callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    pub show_alert: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SetWebhookBody<'a> {
    pub url: &'a str,
    pub secret_token: &'a str,
    pub allowed_updates: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
pub(crate) struct SentMessage {
    pub message_id: MessageId,
}

#[cfg(test)]
mod tests {
    use ember_core::InlineButton;

    use super::*;

    #[test]
    fn send_body_omits_unset_fields() {
        let msg = OutgoingMessage::plain(5, "hi");
        let json = serde_json::to_value(SendMessageBody::from(&msg)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "chat_id": 5, "text": "hi", "disable_web_page_preview": true })
        );
    }

    #[test]
    fn send_body_carries_keyboard_and_thread() {
        let kb = InlineKeyboard::single_row(vec![InlineButton::new("+1h", "ext:1h")]);
        let msg = OutgoingMessage::html(-100, "<b>x</b>").with_keyboard(kb).reply_to(Some(9));
        let json = serde_json::to_value(SendMessageBody::from(&msg)).unwrap();
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["reply_markup"]["inline_keyboard"][0][0]["callback_data"], "ext:1h");
        assert_eq!(json["reply_parameters"]["message_id"], 9);
    }

    #[test]
    fn update_with_reply_and_callback() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 3, "date": 0,
                "chat": {"id": 42, "type": "private"},
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "text": "hello",
                "reply_to_message": {"message_id": 2, "chat": {"id": 42, "type": "private"}}
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();
        assert!(msg.is_private());
        assert_eq!(msg.reply_to_message.unwrap().message_id, 2);

        let raw = r#"{"update_id": 11, "callback_query": {"id": "cb", "from": {"id": 7}, "data": "contact"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.callback_query.unwrap().data.as_deref(), Some("contact"));
    }
}
