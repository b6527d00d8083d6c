//! Anonymous two-party relay sessions between a post author and a reader.

use std::sync::Arc;

use ember_db::Database;
use ember_types::{MessageId, NewRelay, Relay, RelayId, UserId, time::RELAY_WINDOW_SECS};
use tracing::info;

use crate::clock::Clock;
use crate::error::Result;
use crate::gateway::{MessageGateway, OutgoingMessage};
use crate::policy::{Effect, best_effort};
use crate::stats::{self, StatsRecorder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened {
        relay_id: RelayId,
        author_notified: bool,
        requester_notified: bool,
    },
    /// One of the parties already has an active session.
    Busy { user_id: UserId },
    /// A reader tried to contact themselves.
    SelfContact,
}

impl OpenOutcome {
    /// Both sides were told. The session stays open even when a notice
    /// is lost, but the open is then reported as failed.
    pub fn success(&self) -> bool {
        matches!(
            self,
            Self::Opened {
                author_notified: true,
                requester_notified: true,
                ..
            }
        )
    }
}

pub struct RelaySessions {
    db: Arc<Database>,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsRecorder>,
}

impl RelaySessions {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn MessageGateway>,
        clock: Arc<dyn Clock>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            db,
            gateway,
            clock,
            stats,
        }
    }

    /// Open a 30-minute session between `author` (side A) and `requester`
    /// (side B). Each side is told the other's alias.
    pub async fn open_dialog(
        &self,
        author_id: UserId,
        requester_id: UserId,
        author_alias: &str,
        requester_alias: &str,
    ) -> Result<OpenOutcome> {
        if author_id == requester_id {
            return Ok(OpenOutcome::SelfContact);
        }
        let now = self.clock.now();
        for user_id in [author_id, requester_id] {
            if self.db.active_relay_for(user_id, now)?.is_some() {
                return Ok(OpenOutcome::Busy { user_id });
            }
        }

        let relay_id = self.db.create_relay(&NewRelay {
            a_user_id: author_id,
            b_user_id: requester_id,
            a_alias: author_alias.to_string(),
            b_alias: requester_alias.to_string(),
            expires_at: now + RELAY_WINDOW_SECS,
        })?;
        info!(relay_id, "Relay opened");

        let author_msg = self
            .notify(
                author_id,
                format!(
                    "💬 «{requester_alias}» wants to talk about your post. Replies go through the bot for 30 minutes. /end closes the dialog."
                ),
                None,
                Effect::RelayOpenNotice,
            )
            .await;
        let requester_msg = self
            .notify(
                requester_id,
                format!("💬 Dialog with «{author_alias}» is open for 30 minutes. /end closes it."),
                None,
                Effect::RelayOpenNotice,
            )
            .await;

        if let Some(id) = author_msg {
            self.db.record_relay_message(relay_id, author_id, id)?;
        }
        if let Some(id) = requester_msg {
            self.db.record_relay_message(relay_id, requester_id, id)?;
        }
        self.stats.bump(stats::RELAY_START);

        Ok(OpenOutcome::Opened {
            relay_id,
            author_notified: author_msg.is_some(),
            requester_notified: requester_msg.is_some(),
        })
    }

    /// Forward `text` from `sender` through their most recent active
    /// relay. Returns false if the sender has none.
    pub async fn pipe(&self, sender_id: UserId, text: &str) -> Result<bool> {
        let now = self.clock.now();
        let Some(relay) = self.db.active_relay_for(sender_id, now)? else {
            return Ok(false);
        };
        self.forward(&relay, sender_id, text).await?;
        Ok(true)
    }

    /// Route a reply to a previously delivered relay message, which may
    /// belong to an older session than the sender's most recent one.
    pub async fn handle_reply(&self, sender_id: UserId, reply_to: MessageId, text: &str) -> Result<bool> {
        let now = self.clock.now();
        let Some(relay) = self.db.relay_by_message(sender_id, reply_to, now)? else {
            return Ok(false);
        };
        self.forward(&relay, sender_id, text).await?;
        Ok(true)
    }

    /// Close every active session of `user_id`. Returns the peer's alias
    /// of the session that was active, if any.
    pub async fn end_for(&self, user_id: UserId) -> Result<Option<String>> {
        let now = self.clock.now();
        let active = self.db.active_relay_for(user_id, now)?;
        let closed = self.db.close_relays_for(user_id, now)?;
        if closed > 0 {
            info!(user_id, closed, "Relays closed");
        }

        let Some(relay) = active else {
            return Ok(None);
        };
        let Some(view) = relay.view_for(user_id) else {
            return Ok(None);
        };
        self.notify(
            view.peer_id,
            format!("🔕 «{}» ended the dialog.", view.own_alias),
            None,
            Effect::RelayCloseNotice,
        )
        .await;
        Ok(Some(view.peer_alias.to_string()))
    }

    async fn forward(&self, relay: &Relay, sender_id: UserId, text: &str) -> Result<()> {
        let Some(view) = relay.view_for(sender_id) else {
            return Ok(());
        };
        let thread = self.db.last_relay_message(relay.id, view.peer_id)?;
        let delivered = self
            .notify(
                view.peer_id,
                format!("{}: {}", view.own_alias, text),
                thread,
                Effect::RelayForward,
            )
            .await;
        if let Some(id) = delivered {
            self.db.record_relay_message(relay.id, view.peer_id, id)?;
        }
        self.stats.bump(stats::RELAY_MSG);
        Ok(())
    }

    async fn notify(
        &self,
        user_id: UserId,
        text: String,
        reply_to: Option<MessageId>,
        effect: Effect,
    ) -> Option<MessageId> {
        best_effort(
            effect,
            self.gateway
                .send_message(OutgoingMessage::plain(user_id, text).reply_to(reply_to))
                .await,
        )
    }
}
