use std::sync::Arc;

use ember_core::aliases::AliasIssuer;
use ember_core::backup::BackupManager;
use ember_core::roles::RoleCache;
use ember_core::stats::StatsRecorder;
use ember_core::{Clock, MessageGateway, PostLifecycle, RelaySessions, Scheduler};
use ember_db::Database;

use crate::config::Config;

/// Everything an update handler needs, shared between the ingress and the
/// scheduler.
pub struct App {
    pub db: Arc<Database>,
    pub gateway: Arc<dyn MessageGateway>,
    pub clock: Arc<dyn Clock>,
    pub lifecycle: Arc<PostLifecycle>,
    pub relays: RelaySessions,
    pub roles: RoleCache,
    pub aliases: AliasIssuer,
    pub stats: Arc<StatsRecorder>,
    pub backups: Arc<BackupManager>,
    pub default_ttl_seconds: i64,
    pub max_ttl_seconds: i64,
    pub delayed_send_seconds: i64,
}

impl App {
    /// Wire the services together. Returns the app and the scheduler that
    /// drives it.
    pub fn build(
        config: &Config,
        db: Arc<Database>,
        gateway: Arc<dyn MessageGateway>,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, Scheduler) {
        let stats = Arc::new(StatsRecorder::new(db.clone(), clock.clone()));
        let lifecycle = Arc::new(PostLifecycle::new(
            db.clone(),
            gateway.clone(),
            clock.clone(),
            stats.clone(),
            config.extension_buttons.clone(),
        ));
        let backups = Arc::new(BackupManager::new(db.clone(), config.backup_dir.clone(), config.backup_keep));
        let scheduler = Scheduler::new(
            db.clone(),
            gateway.clone(),
            clock.clone(),
            lifecycle.clone(),
            stats.clone(),
            Some(backups.clone()),
        );

        let app = Self {
            relays: RelaySessions::new(db.clone(), gateway.clone(), clock.clone(), stats.clone()),
            roles: RoleCache::new(db.clone(), config.superadmin_id),
            aliases: AliasIssuer::new(db.clone(), clock.clone()),
            db,
            gateway,
            clock,
            lifecycle,
            stats,
            backups,
            default_ttl_seconds: config.default_ttl_seconds,
            max_ttl_seconds: config.max_ttl_seconds,
            delayed_send_seconds: config.delayed_send_seconds,
        };
        (Arc::new(app), scheduler)
    }
}
