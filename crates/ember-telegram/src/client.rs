use std::time::Duration;

use async_trait::async_trait;
use ember_core::{GatewayError, InlineKeyboard, MessageGateway, OutgoingMessage};
use ember_types::{ChatId, MessageId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{
    ALLOWED_UPDATES, AnswerCallbackBody, ApiResponse, EditMarkupBody, EditTextBody, GetUpdatesBody, MessageRef,
    ReplyMarkup, SendMessageBody, SentMessage, SetWebhookBody, Update,
};

/// Headroom over the long-poll timeout before the HTTP request itself gives up.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Bot API client over HTTPS JSON.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    /// `{api_base}/bot{token}`; never logged.
    endpoint: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + POLL_SLACK)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;
        let status = resp.status();
        let envelope: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("{method} ({status}): {}", e.without_url())))?;

        if !envelope.ok {
            return Err(GatewayError::Api {
                code: envelope.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope.description.unwrap_or_default(),
            });
        }
        envelope
            .result
            .ok_or_else(|| GatewayError::Decode(format!("{method}: ok without result")))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, GatewayError> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &GetUpdatesBody {
                    offset,
                    timeout: timeout.as_secs(),
                    allowed_updates: ALLOWED_UPDATES,
                },
            )
            .await?;
        if !updates.is_empty() {
            debug!(count = updates.len(), offset, "Received updates");
        }
        Ok(updates)
    }

    /// Register a webhook with a secret echoed back in
    /// `X-Telegram-Bot-Api-Secret-Token`.
    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "setWebhook",
                &SetWebhookBody {
                    url,
                    secret_token: secret,
                    allowed_updates: ALLOWED_UPDATES,
                },
            )
            .await?;
        Ok(())
    }

    /// Remove any webhook so long polling is allowed.
    pub async fn delete_webhook(&self) -> Result<(), GatewayError> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for TelegramClient {
    async fn send_message(&self, msg: OutgoingMessage) -> Result<MessageId, GatewayError> {
        let sent: SentMessage = self.call("sendMessage", &SendMessageBody::from(&msg)).await?;
        Ok(sent.message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), GatewayError> {
        // Result is the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditTextBody {
                    chat_id,
                    message_id,
                    text,
                    parse_mode: "HTML",
                    reply_markup: keyboard.map(ReplyMarkup::from),
                    disable_web_page_preview: true,
                },
            )
            .await?;
        Ok(())
    }

    async fn edit_message_reply_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &InlineKeyboard,
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .call(
                "editMessageReplyMarkup",
                &EditMarkupBody {
                    chat_id,
                    message_id,
                    reply_markup: ReplyMarkup::from(keyboard),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), GatewayError> {
        let _: bool = self.call("deleteMessage", &MessageRef { chat_id, message_id }).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackBody {
                    callback_query_id: callback_id,
                    text,
                    show_alert: alert,
                },
            )
            .await?;
        Ok(())
    }
}
