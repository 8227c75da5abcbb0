//! Durable table of lock entries.
//!
//! Every operation takes the shared database mutex, so writes (including the
//! delete-then-insert overwrite) never interleave with a read of the same key.

use crate::constants::PACKAGE_DEFAULT;
use crate::db::{lock_db, with_connection, Database};
use crate::error::{AppError, Result};
use crate::models::{EntryId, LockEntry, Preference};
use crate::validation::{validate_entry, validate_key};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct EntryStore {
    db: Arc<Mutex<Database>>,
}

impl EntryStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub fn insert(&self, entry: &LockEntry) -> Result<EntryId> {
        validate_entry(entry)?;
        let id = with_connection(&self.db, "insert lock entry", |conn| entry.insert(conn))?;
        debug!(
            "Inserted lock entry {}/{} (whitelisted: {})",
            entry.package_name, entry.activity_name, entry.whitelisted
        );
        Ok(id)
    }

    pub fn update_lock_time(
        &self,
        lock_until_time: i64,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        validate_key(package_name, activity_name)?;
        with_connection(&self.db, "update lock time", |conn| {
            LockEntry::update_lock_time(conn, lock_until_time, package_name, activity_name)
        })
    }

    pub fn update_ignore_time(
        &self,
        ignore_until_time: i64,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        validate_key(package_name, activity_name)?;
        with_connection(&self.db, "update ignore time", |conn| {
            LockEntry::update_ignore_time(conn, ignore_until_time, package_name, activity_name)
        })
    }

    pub fn update_whitelist(
        &self,
        whitelisted: bool,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        validate_key(package_name, activity_name)?;
        if whitelisted && activity_name == PACKAGE_DEFAULT {
            return Err(AppError::InvalidEntry {
                reason: "a package default entry cannot be whitelisted",
            });
        }
        with_connection(&self.db, "update whitelist", |conn| {
            LockEntry::update_whitelist(conn, whitelisted, package_name, activity_name)
        })
    }

    pub fn query_exact(
        &self,
        package_name: &str,
        activity_name: &str,
    ) -> Result<Option<LockEntry>> {
        with_connection(&self.db, "query lock entry", |conn| {
            LockEntry::find_exact(conn, package_name, activity_name)
        })
    }

    /// Exact activity row, else the package default row, else the empty sentinel.
    pub fn query_with_default_fallback(
        &self,
        package_name: &str,
        activity_name: &str,
    ) -> Result<LockEntry> {
        if package_name.is_empty() || activity_name.is_empty() {
            return Ok(LockEntry::empty());
        }
        let found = with_connection(&self.db, "query lock entry with default", |conn| {
            LockEntry::find_with_default(conn, package_name, activity_name)
        })?;
        Ok(found.unwrap_or_else(LockEntry::empty))
    }

    pub fn query_all_for_package(&self, package_name: &str) -> Result<Vec<LockEntry>> {
        with_connection(&self.db, "query package entries", |conn| {
            LockEntry::find_by_package(conn, package_name)
        })
    }

    pub fn query_all(&self) -> Result<Vec<LockEntry>> {
        with_connection(&self.db, "query all entries", LockEntry::find_all)
    }

    pub fn delete_by_package(&self, package_name: &str) -> Result<usize> {
        let deleted = with_connection(&self.db, "delete package entries", |conn| {
            LockEntry::delete_by_package(conn, package_name)
        })?;
        debug!("Deleted {deleted} entries for {package_name}");
        Ok(deleted)
    }

    pub fn delete_by_package_activity(
        &self,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        validate_key(package_name, activity_name)?;
        with_connection(&self.db, "delete lock entry", |conn| {
            LockEntry::delete_exact(conn, package_name, activity_name)
        })
    }

    pub fn delete_all(&self) -> Result<usize> {
        let deleted = with_connection(&self.db, "delete all entries", LockEntry::delete_all)?;
        info!("Deleted all {deleted} lock entries");
        Ok(deleted)
    }

    /// Drop the underlying file and start over. Also clears the master PIN.
    pub fn drop_store(&self) -> Result<()> {
        let mut db = lock_db(&self.db);
        warn!("Dropping lock store");
        db.recreate()
    }

    /// Lock a whole app: one `PACKAGE_DEFAULT` row covers every activity.
    pub fn lock_package(&self, package_name: &str, is_system: bool) -> Result<EntryId> {
        let entry = LockEntry {
            is_system_application: is_system,
            ..LockEntry::package_default(package_name)
        };
        self.insert(&entry)
    }

    /// Unlock a whole app, removing its default row and every per-activity row.
    pub fn unlock_package(&self, package_name: &str) -> Result<usize> {
        self.delete_by_package(package_name)
    }

    /// Toggle the lock on a single activity.
    pub fn set_activity_lock(
        &self,
        package_name: &str,
        activity_name: &str,
        locked: bool,
        is_system: bool,
    ) -> Result<()> {
        if locked {
            let entry = LockEntry {
                is_system_application: is_system,
                ..LockEntry::new(package_name, activity_name)
            };
            self.insert(&entry)?;
        } else {
            self.delete_by_package_activity(package_name, activity_name)?;
        }
        Ok(())
    }

    /// Toggle the whitelist flag, creating a concrete row when none exists yet.
    pub fn set_whitelisted(
        &self,
        package_name: &str,
        activity_name: &str,
        whitelisted: bool,
        is_system: bool,
    ) -> Result<()> {
        let updated = self.update_whitelist(whitelisted, package_name, activity_name)?;
        if updated == 0 && whitelisted {
            let entry = LockEntry {
                is_system_application: is_system,
                whitelisted: true,
                ..LockEntry::new(package_name, activity_name)
            };
            self.insert(&entry)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &Arc<Mutex<Database>> {
        &self.db
    }

    pub(crate) fn preference(&self, key: &str) -> Result<Option<String>> {
        with_connection(&self.db, "read preference", |conn| Preference::get(conn, key))
    }

    pub(crate) fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        with_connection(&self.db, "write preference", |conn| {
            Preference::set(conn, key, value)
        })
    }

    /// Apply several preference writes (`None` removes the key) in one transaction.
    pub(crate) fn write_preferences(&self, changes: &[(&str, Option<&str>)]) -> Result<()> {
        with_connection(&self.db, "write preferences", |conn| {
            let tx = conn.unchecked_transaction()?;
            for (key, value) in changes {
                match value {
                    Some(value) => Preference::set(&tx, key, value)?,
                    None => {
                        Preference::remove(&tx, key)?;
                    }
                }
            }
            tx.commit()
        })
    }
}
