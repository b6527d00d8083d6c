use std::collections::BTreeMap;

use anyhow::Result;

use crate::Database;

/// Day -> (key -> count), both ordered.
pub type DailyStats = BTreeMap<String, BTreeMap<String, i64>>;

impl Database {
    /// Bump the counter for `key` on `day` ("YYYY-MM-DD").
    pub fn inc_stat(&self, day: &str, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO stats (day, key, cnt) VALUES (?1, ?2, 1)
                 ON CONFLICT(day, key) DO UPDATE SET cnt = cnt + 1",
                (day, key),
            )?;
            Ok(())
        })
    }

    /// All counters from `since_day` (inclusive) grouped by day.
    pub fn stats_since(&self, since_day: &str) -> Result<DailyStats> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT day, key, SUM(cnt) FROM stats WHERE day >= ?1 GROUP BY day, key ORDER BY day, key",
            )?;
            let rows = stmt
                .query_map([since_day], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut out = DailyStats::new();
            for (day, key, total) in rows {
                out.entry(day).or_default().insert(key, total);
            }
            Ok(out)
        })
    }
}
