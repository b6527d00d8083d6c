use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Source of "now". All expiry math uses `now()` (Unix seconds); user-facing
/// rendering and calendar rules use `local_now()` in the configured zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;

    fn tz(&self) -> Tz;

    fn local(&self, ts: i64) -> DateTime<Tz> {
        DateTime::<Utc>::from_timestamp(ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.tz())
    }

    fn local_now(&self) -> DateTime<Tz> {
        self.local(self.now())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn tz(&self) -> Tz {
        self.tz
    }
}

/// Clock driven by hand, for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
    tz: Tz,
}

impl ManualClock {
    pub fn new(now: i64, tz: Tz) -> Self {
        Self {
            now: AtomicI64::new(now),
            tz,
        }
    }

    pub fn utc(now: i64) -> Self {
        Self::new(now, Tz::UTC)
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn tz(&self) -> Tz {
        self.tz
    }
}
