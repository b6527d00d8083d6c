#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ember_core::stats::StatsRecorder;
use ember_core::{
    GatewayError, InlineKeyboard, ManualClock, MessageGateway, OutgoingMessage, PostLifecycle, RelaySessions,
    Scheduler,
};
use ember_db::Database;
use ember_types::{ChatId, ExtensionKind, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { msg: OutgoingMessage, id: MessageId },
    EditText { chat_id: ChatId, message_id: MessageId, text: String, keyboard: Option<InlineKeyboard> },
    EditMarkup { chat_id: ChatId, message_id: MessageId, keyboard: InlineKeyboard },
    Delete { chat_id: ChatId, message_id: MessageId },
    Answer { callback_id: String, text: Option<String>, alert: bool },
}

/// Gateway fake that records every call and hands out sequential message ids.
pub struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI64,
    failing_chats: Mutex<HashSet<ChatId>>,
    fail_edits: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1000),
            failing_chats: Mutex::new(HashSet::new()),
            fail_edits: AtomicBool::new(false),
        }
    }

    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn heal(&self) {
        self.failing_chats.lock().unwrap().clear();
        self.fail_edits.store(false, Ordering::SeqCst);
    }

    pub fn fail_edits(&self) {
        self.fail_edits.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends_to(&self, chat_id: ChatId) -> Vec<(OutgoingMessage, MessageId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { msg, id } if msg.chat_id == chat_id => Some((msg, id)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(ChatId, MessageId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { chat_id, message_id } => Some((chat_id, message_id)),
                _ => None,
            })
            .collect()
    }

    pub fn last_edit_text(&self) -> Option<(String, Option<InlineKeyboard>)> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::EditText { text, keyboard, .. } => Some((text, keyboard)),
            _ => None,
        })
    }

    fn check(&self, chat_id: ChatId) -> Result<(), GatewayError> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(GatewayError::Api {
                code: 403,
                description: "Forbidden: bot was blocked by the user".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send_message(&self, msg: OutgoingMessage) -> Result<MessageId, GatewayError> {
        self.check(msg.chat_id)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call::Send { msg, id });
        Ok(id)
    }

    async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), GatewayError> {
        self.check(chat_id)?;
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("timed out".into()));
        }
        self.calls.lock().unwrap().push(Call::EditText {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn edit_message_reply_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        keyboard: &InlineKeyboard,
    ) -> Result<(), GatewayError> {
        self.check(chat_id)?;
        self.calls.lock().unwrap().push(Call::EditMarkup {
            chat_id,
            message_id,
            keyboard: keyboard.clone(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), GatewayError> {
        self.check(chat_id)?;
        self.calls.lock().unwrap().push(Call::Delete { chat_id, message_id });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(Call::Answer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }
}

pub const CHANNEL: ChatId = -100_500;

/// Every service wired to an in-memory database, the recording gateway and
/// a manual UTC clock.
pub struct Harness {
    pub db: Arc<Database>,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<StatsRecorder>,
    pub lifecycle: Arc<PostLifecycle>,
    pub relays: RelaySessions,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(now: i64) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let gateway = Arc::new(RecordingGateway::new());
        let clock = Arc::new(ManualClock::utc(now));
        let stats = Arc::new(StatsRecorder::new(db.clone(), clock.clone()));
        let lifecycle = Arc::new(PostLifecycle::new(
            db.clone(),
            gateway.clone(),
            clock.clone(),
            stats.clone(),
            vec![ExtensionKind::H1, ExtensionKind::H12],
        ));
        let relays = RelaySessions::new(db.clone(), gateway.clone(), clock.clone(), stats.clone());
        let scheduler = Scheduler::new(
            db.clone(),
            gateway.clone(),
            clock.clone(),
            lifecycle.clone(),
            stats.clone(),
            None,
        );
        Self {
            db,
            gateway,
            clock,
            stats,
            lifecycle,
            relays,
            scheduler,
        }
    }
}
