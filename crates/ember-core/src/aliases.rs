use std::sync::Arc;

use anyhow::Result;
use ember_db::Database;
use ember_types::UserId;
use rand::seq::IndexedRandom;

use crate::clock::Clock;

const ADJECTIVES: &[&str] = &[
    "Quiet", "Bold", "Amber", "Silver", "Hidden", "Restless", "Gentle", "Crimson", "Velvet", "Wandering",
    "Sleepy", "Clever", "Distant", "Frosty", "Golden", "Misty",
];

const NOUNS: &[&str] = &[
    "Fox", "Owl", "Heron", "Lynx", "Otter", "Raven", "Moth", "Badger", "Comet", "Lantern", "Willow", "Ember",
    "Pike", "Sparrow", "Marten", "Wren",
];

/// Hands out one pseudonym per user per local day.
pub struct AliasIssuer {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl AliasIssuer {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn alias_for(&self, user_id: UserId) -> Result<String> {
        let day = self.clock.local_now().format("%Y-%m-%d").to_string();
        if let Some(alias) = self.db.alias_for_day(user_id, &day)? {
            return Ok(alias);
        }
        self.db.issue_alias(user_id, &day, &random_alias())
    }
}

fn random_alias() -> String {
    let mut rng = rand::rng();
    let adj = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Fox");
    format!("{adj} {noun}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn stable_within_a_day_and_rotates_after() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::utc(1_792_195_200));
        let issuer = AliasIssuer::new(db.clone(), clock.clone());

        let first = issuer.alias_for(1).unwrap();
        clock.advance(3600);
        assert_eq!(issuer.alias_for(1).unwrap(), first);

        clock.advance(86_400);
        issuer.alias_for(1).unwrap();
        assert_eq!(db.alias_for_day(1, "2026-10-17").unwrap().as_deref(), Some(first.as_str()));
        assert!(db.alias_for_day(1, "2026-10-18").unwrap().is_some());
    }
}
