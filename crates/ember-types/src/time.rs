/// Publish times are floored to this bucket before the TTL is added, so posts
/// sent within the same five minutes share an end time.
pub const BUCKET_SECS: i64 = 300;

/// Fixed lifetime of an anonymous relay session. Never extended.
pub const RELAY_WINDOW_SECS: i64 = 30 * 60;

pub fn bucket_floor(ts: i64) -> i64 {
    ts.div_euclid(BUCKET_SECS) * BUCKET_SECS
}

/// Expiry for a post published at `now` with the requested TTL.
pub fn base_delete_at(now: i64, ttl_seconds: i64) -> i64 {
    bucket_floor(now) + ttl_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_to_five_minutes() {
        assert_eq!(bucket_floor(1000), 900);
        assert_eq!(bucket_floor(1200), 1200);
        assert_eq!(bucket_floor(1499), 1200);
    }

    #[test]
    fn lifetime_shrinks_by_elapsed_bucket_time() {
        // 4 minutes into the bucket: a 15 minute TTL leaves 11 minutes.
        let now = 1200 + 240;
        assert_eq!(base_delete_at(now, 900) - now, 660);
    }
}
