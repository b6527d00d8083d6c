//! Channel post lifecycle: publish, extension toggles and footer refresh.

use std::sync::Arc;

use ember_db::Database;
use ember_types::{ChatId, ExtensionKind, Post, PostKey, ToggleOutcome, UserId, time};
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::gateway::{MessageGateway, OutgoingMessage};
use crate::policy::{Effect, best_effort, required};
use crate::render;
use crate::stats::{self, StatsRecorder};

pub const REFUSED_REASON: &str = "cannot remove contribution: remaining time is less than this extension's duration";

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub channel_id: ChatId,
    pub author_id: UserId,
    pub alias: String,
    pub text: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendOutcome {
    Toggled { active: bool, delete_at: i64 },
    Refused,
    PostGone,
}

impl ExtendOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, Self::Toggled { .. })
    }

    /// Short text for the callback answer.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Toggled { active: true, .. } => "Extension added",
            Self::Toggled { active: false, .. } => "Extension removed",
            Self::Refused => REFUSED_REASON,
            Self::PostGone => "This post has already burned",
        }
    }
}

pub struct PostLifecycle {
    db: Arc<Database>,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsRecorder>,
    default_buttons: Vec<ExtensionKind>,
}

impl PostLifecycle {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn MessageGateway>,
        clock: Arc<dyn Clock>,
        stats: Arc<StatsRecorder>,
        default_buttons: Vec<ExtensionKind>,
    ) -> Self {
        Self {
            db,
            gateway,
            clock,
            stats,
            default_buttons,
        }
    }

    /// Extension buttons for posts in `channel_id`: the mailbox's own list,
    /// or the default when it has none.
    pub fn buttons_for(&self, channel_id: ChatId) -> Result<Vec<ExtensionKind>> {
        let custom = self
            .db
            .mailbox_by_channel(channel_id)?
            .and_then(|m| m.extension_buttons);
        Ok(custom.unwrap_or_else(|| self.default_buttons.clone()))
    }

    /// Send a post to the channel and record it. Nothing is stored if the
    /// send fails.
    pub async fn publish(&self, req: PublishRequest) -> Result<Post> {
        let now = self.clock.now();
        let base = time::base_delete_at(now, req.ttl_seconds);

        let body = render::post_text(self.clock.as_ref(), &req.text, &req.alias, base);
        let buttons = self.buttons_for(req.channel_id)?;
        let keyboard = render::channel_keyboard(&Default::default(), &buttons, true);
        let message_id = required(
            Effect::PublishSend,
            self.gateway
                .send_message(OutgoingMessage::html(req.channel_id, body).with_keyboard(keyboard))
                .await,
        )?;

        let post = Post {
            key: PostKey::new(req.channel_id, message_id),
            author_id: req.author_id,
            alias: req.alias,
            base_text: req.text,
            base_delete_at: base,
            delete_at: base,
        };
        if let Err(e) = self.db.insert_post(&post) {
            // The message is live but untracked; it will not burn.
            error!(key = %post.key, error = %e, "Post sent but could not be recorded");
            return Err(e.into());
        }

        self.stats.bump(stats::POSTED);
        info!(key = %post.key, delete_at = post.delete_at, "Post published");
        Ok(post)
    }

    /// Recompute `delete_at` from the ledger, then redraw the footer and
    /// keyboard. Returns `None` if the post no longer exists.
    pub async fn apply_extensions_and_update(&self, key: PostKey) -> Result<Option<Post>> {
        let Some(post) = self.db.refresh_delete_at(key)? else {
            return Ok(None);
        };
        let counts = self.db.extension_counts(key)?;

        let body = render::post_text(self.clock.as_ref(), &post.base_text, &post.alias, post.delete_at);
        let keyboard = render::channel_keyboard(&counts, &self.buttons_for(key.chat_id)?, true);
        let edited = self
            .gateway
            .edit_message_text(key.chat_id, key.message_id, &body, Some(&keyboard))
            .await;
        match edited {
            Ok(()) => {}
            // Same footer text; only the counts may differ.
            Err(e) if e.is_not_modified() => {
                best_effort(
                    Effect::KeyboardRefresh,
                    self.gateway
                        .edit_message_reply_markup(key.chat_id, key.message_id, &keyboard)
                        .await,
                );
            }
            Err(e) => {
                best_effort::<()>(Effect::FooterRefresh, Err(e));
            }
        }
        Ok(Some(post))
    }

    /// Toggle `user_id`'s extension of `kind`. Removing is refused once the
    /// post has less time left than the extension adds.
    pub async fn toggle_extension(&self, key: PostKey, user_id: UserId, kind: ExtensionKind) -> Result<ExtendOutcome> {
        let Some(post) = self.db.get_post(key)? else {
            return Ok(ExtendOutcome::PostGone);
        };
        let remaining = post.remaining(self.clock.now());

        let outcome = self
            .db
            .toggle_extension_guarded(key, user_id, kind, || remaining >= kind.seconds())?;
        let active = match outcome {
            ToggleOutcome::Refused => return Ok(ExtendOutcome::Refused),
            ToggleOutcome::Activated => true,
            ToggleOutcome::Deactivated => false,
        };

        let Some(updated) = self.apply_extensions_and_update(key).await? else {
            return Ok(ExtendOutcome::PostGone);
        };
        if active {
            self.stats.bump(&stats::extend_key(kind));
        }
        Ok(ExtendOutcome::Toggled {
            active,
            delete_at: updated.delete_at,
        })
    }
}
