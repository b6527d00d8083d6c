//! Daily database snapshots with simple count-based retention.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use ember_db::Database;
use tracing::{info, warn};

const PREFIX: &str = "ember-";
const MANUAL_PREFIX: &str = "ember-manual-";
const SUFFIX: &str = ".db";

/// Local hour during which the daily snapshot is taken; the window lasts
/// five minutes so a slow tick cannot skip it.
pub const BACKUP_HOUR: u32 = 3;
const BACKUP_WINDOW_MINUTES: u32 = 5;

pub struct BackupManager {
    db: Arc<Database>,
    dir: PathBuf,
    keep: usize,
    last_daily: Mutex<Option<NaiveDate>>,
}

impl BackupManager {
    pub fn new(db: Arc<Database>, dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            db,
            dir: dir.into(),
            keep: keep.max(1),
            last_daily: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{PREFIX}{}{SUFFIX}", date.format("%Y-%m-%d")))
    }

    /// Whether today's snapshot exists. The directory is the durable record,
    /// so a restarted process does not take a second one.
    pub fn backed_up_on(&self, date: NaiveDate) -> bool {
        if self.last_daily.lock().is_ok_and(|d| *d == Some(date)) {
            return true;
        }
        self.daily_path(date).exists()
    }

    /// Take the daily snapshot if `local_now` is inside the window and none
    /// exists yet for the day.
    pub fn run_if_due(&self, local_now: DateTime<Tz>) -> Result<Option<PathBuf>> {
        if local_now.hour() != BACKUP_HOUR || local_now.minute() >= BACKUP_WINDOW_MINUTES {
            return Ok(None);
        }
        let date = local_now.date_naive();
        if self.backed_up_on(date) {
            return Ok(None);
        }
        let path = self.daily_path(date);
        self.snapshot(&path)?;
        if let Ok(mut last) = self.last_daily.lock() {
            *last = Some(date);
        }
        Ok(Some(path))
    }

    /// Out-of-schedule snapshot, e.g. from an admin command.
    pub fn run_now(&self, local_now: DateTime<Tz>) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{MANUAL_PREFIX}{}{SUFFIX}", local_now.format("%Y-%m-%d-%H%M%S")));
        self.snapshot(&path)?;
        Ok(path)
    }

    fn snapshot(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating backup dir {}", self.dir.display()))?;
        self.db.backup_to(path)?;
        if let Err(e) = self.prune() {
            warn!(error = %e, "Backup retention pass failed");
        }
        Ok(())
    }

    /// Keep the newest `keep` daily snapshots and, separately, the newest
    /// `keep` manual ones. Names sort chronologically within each kind.
    pub fn prune(&self) -> Result<usize> {
        let mut daily = Vec::new();
        let mut manual = Vec::new();
        for path in fs::read_dir(&self.dir)?.filter_map(|e| e.ok()).map(|e| e.path()) {
            match path.file_name().and_then(|n| n.to_str()).and_then(snapshot_kind) {
                Some(SnapshotKind::Daily) => daily.push(path),
                Some(SnapshotKind::Manual) => manual.push(path),
                None => {}
            }
        }
        Ok(self.trim(daily)? + self.trim(manual)?)
    }

    fn trim(&self, mut files: Vec<PathBuf>) -> Result<usize> {
        if files.len() <= self.keep {
            return Ok(0);
        }
        files.sort();
        let excess = files.len() - self.keep;
        for old in &files[..excess] {
            fs::remove_file(old).with_context(|| format!("removing {}", old.display()))?;
            info!("Removed old backup {}", old.display());
        }
        Ok(excess)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SnapshotKind {
    Daily,
    Manual,
}

fn snapshot_kind(name: &str) -> Option<SnapshotKind> {
    if let Some(stamp) = name.strip_prefix(MANUAL_PREFIX).and_then(|n| n.strip_suffix(SUFFIX)) {
        return chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d-%H%M%S")
            .ok()
            .map(|_| SnapshotKind::Manual);
    }
    let stamp = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok().map(|_| SnapshotKind::Daily)
}
