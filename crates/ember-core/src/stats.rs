use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Days};
use chrono_tz::Tz;
use ember_db::Database;
use ember_types::ExtensionKind;
use tracing::warn;

use crate::clock::Clock;

pub const POSTED: &str = "posted";
pub const RELAY_START: &str = "relay_start";
pub const RELAY_MSG: &str = "relay_msg";
pub const DELAYED: &str = "delayed";

pub fn extend_key(kind: ExtensionKind) -> String {
    format!("extend_{kind}")
}

/// Daily activity counters keyed by local calendar day.
pub struct StatsRecorder {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl StatsRecorder {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Counters never fail the operation they describe.
    pub fn bump(&self, key: &str) {
        let day = self.clock.local_now().format("%Y-%m-%d").to_string();
        if let Err(e) = self.db.inc_stat(&day, key) {
            warn!(key, error = %e, "Failed to record stat");
        }
    }

    /// Summary of the last seven local days, or `None` when nothing happened.
    pub fn weekly_summary(&self, local_now: DateTime<Tz>) -> anyhow::Result<Option<String>> {
        let since = local_now
            .date_naive()
            .checked_sub_days(Days::new(6))
            .unwrap_or(local_now.date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let stats = self.db.stats_since(&since)?;
        if stats.is_empty() {
            return Ok(None);
        }

        let mut out = String::from("📊 Activity over the last 7 days\n");
        for (day, counters) in &stats {
            let line = counters
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "\n{day}  {line}");
        }
        Ok(Some(out))
    }
}
