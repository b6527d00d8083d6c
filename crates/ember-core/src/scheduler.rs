//! Periodic driver for every time-based transition: post expiry, relay and
//! cooldown purge, delayed sends, weekly stats and the daily backup.
//!
//! Each step runs on its own; a failing step is logged and the tick moves on.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Timelike};
use ember_db::Database;
use ember_types::{DelayedItem, MailboxId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::clock::Clock;
use crate::error::Result;
use crate::gateway::{MessageGateway, OutgoingMessage};
use crate::lifecycle::{PostLifecycle, PublishRequest};
use crate::policy::{Effect, best_effort};
use crate::render;
use crate::stats::{self, StatsRecorder};

/// What a single tick did. Steps that failed leave their fields at zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub expired_posts: usize,
    pub purged_relays: usize,
    pub purged_cooldowns: usize,
    pub delayed_published: usize,
    pub delayed_discarded: usize,
    pub delayed_failed: usize,
    pub stats_sent: usize,
    pub backup: Option<PathBuf>,
}

pub struct Scheduler {
    db: Arc<Database>,
    gateway: Arc<dyn MessageGateway>,
    clock: Arc<dyn Clock>,
    lifecycle: Arc<PostLifecycle>,
    stats: Arc<StatsRecorder>,
    backups: Option<Arc<BackupManager>>,
}

impl Scheduler {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn MessageGateway>,
        clock: Arc<dyn Clock>,
        lifecycle: Arc<PostLifecycle>,
        stats: Arc<StatsRecorder>,
        backups: Option<Arc<BackupManager>>,
    ) -> Self {
        Self {
            db,
            gateway,
            clock,
            lifecycle,
            stats,
            backups,
        }
    }

    /// Tick every `every` until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(every_secs = every.as_secs(), "Scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report != TickReport::default() {
                        debug!(?report, "Tick done");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.expire_posts().await {
            Ok(n) => report.expired_posts = n,
            Err(e) => warn!(error = %e, "Expire step failed"),
        }
        match self.db.purge_expired_relays(self.clock.now()) {
            Ok(n) => report.purged_relays = n,
            Err(e) => warn!(error = %e, "Relay purge step failed"),
        }
        match self.db.purge_expired_cooldowns(self.clock.now()) {
            Ok(n) => report.purged_cooldowns = n,
            Err(e) => warn!(error = %e, "Cooldown purge step failed"),
        }
        if let Err(e) = self.drain_delayed(&mut report).await {
            warn!(error = %e, "Delayed queue step failed");
        }
        match self.weekly_stats().await {
            Ok(n) => report.stats_sent = n,
            Err(e) => warn!(error = %e, "Weekly stats step failed"),
        }
        match self.daily_backup().await {
            Ok(path) => report.backup = path,
            Err(e) => warn!(error = %e, "Backup step failed"),
        }

        report
    }

    async fn expire_posts(&self) -> Result<usize> {
        let keys = self.db.list_expired_posts(self.clock.now())?;
        if keys.is_empty() {
            return Ok(0);
        }
        for key in &keys {
            // Already gone if someone removed it by hand.
            best_effort(
                Effect::ExpiredDelete,
                self.gateway.delete_message(key.chat_id, key.message_id).await,
            );
        }
        let removed = self.db.delete_posts_batch(&keys)?;
        self.db.delete_extensions_batch(&keys)?;
        info!(count = removed, "Expired posts burned");
        Ok(removed)
    }

    async fn drain_delayed(&self, report: &mut TickReport) -> Result<()> {
        let due = self.db.due_delayed(self.clock.now())?;
        if due.is_empty() {
            return Ok(());
        }
        let mailbox_ids: Vec<MailboxId> = due
            .iter()
            .map(|i| i.mailbox_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mailboxes = self.db.mailboxes_by_ids(&mailbox_ids)?;

        let mut processed = Vec::with_capacity(due.len());
        for item in due {
            let Some(mailbox) = mailboxes.get(&item.mailbox_id) else {
                debug!(item = item.id, mailbox = item.mailbox_id, "Mailbox gone, dropping delayed post");
                report.delayed_discarded += 1;
                processed.push(item.id);
                continue;
            };
            let req = PublishRequest {
                channel_id: mailbox.channel_id,
                author_id: item.user_id,
                alias: item.alias.clone(),
                text: item.text.clone(),
                ttl_seconds: item.ttl_seconds,
            };
            match self.lifecycle.publish(req).await {
                Ok(post) => {
                    report.delayed_published += 1;
                    processed.push(item.id);
                    self.stats.bump(stats::DELAYED);
                    self.after_delayed_publish(&item, &mailbox.title, post.delete_at).await;
                }
                Err(e) => {
                    // Left in the queue; the next tick retries.
                    report.delayed_failed += 1;
                    warn!(item = item.id, error = %e, "Delayed publish failed");
                }
            }
        }

        self.db.delete_delayed_batch(&processed)?;
        Ok(())
    }

    async fn after_delayed_publish(&self, item: &DelayedItem, mailbox_title: &str, delete_at: i64) {
        if let Some(cancel_id) = item.cancel_message_id {
            best_effort(Effect::DelayedNotice, self.gateway.delete_message(item.user_id, cancel_id).await);
        }
        let text = format!(
            "✅ Your delayed post went out to «{}». It burns at {}.",
            mailbox_title,
            render::burn_time(self.clock.as_ref(), delete_at)
        );
        best_effort(
            Effect::DelayedNotice,
            self.gateway.send_message(OutgoingMessage::plain(item.user_id, text)).await,
        );
    }

    async fn weekly_stats(&self) -> Result<usize> {
        let local = self.clock.local_now();
        let weekday = local.weekday().number_from_monday();
        let hhmm = format!("{:02}:{:02}", local.hour(), local.minute());

        let due: Vec<_> = self
            .db
            .list_mailboxes()?
            .into_iter()
            .filter(|m| m.stat_day == Some(weekday) && m.stat_time.as_deref() == Some(hhmm.as_str()))
            .collect();
        if due.is_empty() {
            return Ok(0);
        }
        let Some(summary) = self.stats.weekly_summary(local)? else {
            return Ok(0);
        };

        let marker = local.format("%Y-%m-%d %H:%M").to_string();
        let mut sent = 0;
        for mailbox in due {
            if !self.db.claim_stats_slot(mailbox.id, &marker)? {
                continue;
            }
            let text = format!("{}\n\n{}", mailbox.title, summary);
            if best_effort(
                Effect::StatsBroadcast,
                self.gateway.send_message(OutgoingMessage::plain(mailbox.channel_id, text)).await,
            )
            .is_some()
            {
                sent += 1;
            }
        }
        Ok(sent)
    }

    async fn daily_backup(&self) -> Result<Option<PathBuf>> {
        let Some(backups) = self.backups.clone() else {
            return Ok(None);
        };
        let local = self.clock.local_now();
        let path = tokio::task::spawn_blocking(move || backups.run_if_due(local))
            .await
            .map_err(anyhow::Error::from)??;
        Ok(path)
    }
}
