use std::time::Duration;

use ember_core::{GatewayError, InlineButton, InlineKeyboard, MessageGateway, OutgoingMessage};
use ember_telegram::TelegramClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:abc";

fn client(server: &MockServer) -> TelegramClient {
    TelegramClient::new(&server.uri(), TOKEN, Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn send_message_returns_the_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": -100,
            "parse_mode": "HTML",
            "reply_markup": { "inline_keyboard": [[{ "text": "+1h", "callback_data": "ext:1h" }]] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 77, "chat": { "id": -100, "type": "channel" }, "date": 0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let kb = InlineKeyboard::single_row(vec![InlineButton::new("+1h", "ext:1h")]);
    let id = client(&server)
        .send_message(OutgoingMessage::html(-100, "<b>hi</b>").with_keyboard(kb))
        .await
        .unwrap();
    assert_eq!(id, 77);
}

#[tokio::test]
async fn api_errors_keep_code_and_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/editMessageText")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .edit_message_text(-100, 5, "same", None)
        .await
        .unwrap_err();
    assert!(err.is_not_modified());
    assert!(matches!(err, GatewayError::Api { code: 400, .. }));
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/deleteMessage")))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).delete_message(-100, 5).await.unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
    assert!(!err.to_string().contains(TOKEN));
}

#[tokio::test]
async fn get_updates_parses_messages_and_callbacks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [
                { "update_id": 10, "message": {
                    "message_id": 1, "date": 0,
                    "chat": { "id": 42, "type": "private" },
                    "from": { "id": 42, "is_bot": false, "first_name": "A" },
                    "text": "/start 3"
                }},
                { "update_id": 11, "callback_query": {
                    "id": "q1", "from": { "id": 42, "is_bot": false, "first_name": "A" },
                    "message": { "message_id": 9, "chat": { "id": -100, "type": "channel" }, "date": 0 },
                    "data": "ext:1h"
                }}
            ]
        })))
        .mount(&server)
        .await;

    let updates = client(&server).get_updates(10, Duration::from_secs(0)).await.unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("/start 3"));
    let cb = updates[1].callback_query.as_ref().unwrap();
    assert_eq!(cb.data.as_deref(), Some("ext:1h"));
    assert_eq!(cb.message.as_ref().unwrap().chat.id, -100);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = TelegramClient::new(&uri, TOKEN, Duration::from_secs(1)).unwrap();
    let err = client.answer_callback("q", Some("ok"), false).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert!(!err.to_string().contains(TOKEN));
}
