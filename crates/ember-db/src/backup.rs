use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::Database;

impl Database {
    /// Write a consistent copy of the database to `dest` with `VACUUM INTO`.
    /// Fails if `dest` already exists.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        if dest.exists() {
            bail!("backup target already exists: {}", dest.display());
        }
        let target = dest
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("backup path is not valid UTF-8: {}", dest.display()))?;
        self.with_conn(|conn| {
            conn.execute("VACUUM INTO ?1", [target])?;
            Ok(())
        })?;
        info!("Database backed up to {}", dest.display());
        Ok(())
    }
}
