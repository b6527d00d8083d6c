//! Cached role lookup. Entries are loaded on first use and dropped when a
//! [`RoleEvent`] for the user is published.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Result, anyhow};
use ember_db::Database;
use ember_types::{Role, UserId};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleEvent {
    RoleChanged(UserId),
    UserAdded(UserId),
    UserRemoved(UserId),
}

impl RoleEvent {
    fn user_id(self) -> UserId {
        match self {
            Self::RoleChanged(id) | Self::UserAdded(id) | Self::UserRemoved(id) => id,
        }
    }
}

pub struct RoleCache {
    db: Arc<Database>,
    superadmin: Option<UserId>,
    entries: RwLock<HashMap<UserId, Role>>,
}

impl RoleCache {
    pub fn new(db: Arc<Database>, superadmin: Option<UserId>) -> Self {
        Self {
            db,
            superadmin,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn role_of(&self, user_id: UserId) -> Result<Role> {
        if self.superadmin == Some(user_id) {
            return Ok(Role::Superadmin);
        }
        {
            let entries = self.entries.read().map_err(|_| anyhow!("role cache poisoned"))?;
            if let Some(role) = entries.get(&user_id) {
                return Ok(*role);
            }
        }
        let role = self.db.user_role(user_id)?.unwrap_or(Role::User);
        self.entries
            .write()
            .map_err(|_| anyhow!("role cache poisoned"))?
            .insert(user_id, role);
        Ok(role)
    }

    pub fn is_admin(&self, user_id: UserId) -> Result<bool> {
        Ok(self.role_of(user_id)?.is_admin())
    }

    /// Record a first contact. Returns true if the user was new.
    pub fn register(&self, user_id: UserId) -> Result<bool> {
        let added = self.db.ensure_user(user_id)?;
        if added {
            self.invalidate(RoleEvent::UserAdded(user_id));
        }
        Ok(added)
    }

    /// Persist a new role and invalidate the cached entry.
    pub fn grant(&self, user_id: UserId, role: Role) -> Result<()> {
        self.db.set_user_role(user_id, role)?;
        self.invalidate(RoleEvent::RoleChanged(user_id));
        Ok(())
    }

    pub fn remove(&self, user_id: UserId) -> Result<bool> {
        let removed = self.db.remove_user(user_id)?;
        self.invalidate(RoleEvent::UserRemoved(user_id));
        Ok(removed)
    }

    pub fn invalidate(&self, event: RoleEvent) {
        debug!(?event, "Role cache invalidated");
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&event.user_id());
        }
    }
}
