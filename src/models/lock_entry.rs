use crate::constants::PACKAGE_DEFAULT;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::{Deserialize, Serialize};

pub type EntryId = i64;

const SELECT_COLUMNS: &str = "SELECT packageName, activityName, lockCode, lockUntilTime, \
     ignoreUntilTime, isSystemApplication, whitelist FROM lock_entries";

/// One locked (or whitelisted) activity, or a whole package via `PACKAGE_DEFAULT`.
///
/// An entry with an empty package or activity name is the "nothing locked"
/// sentinel returned by lookups; it is never written to the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub package_name: String,
    pub activity_name: String,
    pub lock_code: Option<String>,
    /// Epoch millis until which every PIN attempt is rejected
    pub lock_until_time: i64,
    /// Epoch millis until which the entry is not challenged
    pub ignore_until_time: i64,
    pub is_system_application: bool,
    pub whitelisted: bool,
}

impl LockEntry {
    pub fn new(package_name: &str, activity_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            activity_name: activity_name.to_string(),
            ..Self::default()
        }
    }

    pub fn package_default(package_name: &str) -> Self {
        Self::new(package_name, PACKAGE_DEFAULT)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.package_name.is_empty() || self.activity_name.is_empty()
    }

    pub fn is_package_default(&self) -> bool {
        self.activity_name == PACKAGE_DEFAULT
    }

    pub fn is_hard_locked(&self, now: i64) -> bool {
        now < self.lock_until_time
    }

    pub fn is_ignored(&self, now: i64) -> bool {
        now < self.ignore_until_time
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            package_name: row.get(0)?,
            activity_name: row.get(1)?,
            lock_code: row.get(2)?,
            lock_until_time: row.get(3)?,
            ignore_until_time: row.get(4)?,
            is_system_application: row.get(5)?,
            whitelisted: row.get(6)?,
        })
    }

    /// Replaces any row at the same key. Delete and insert share one transaction.
    pub fn insert(&self, conn: &Connection) -> Result<EntryId> {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM lock_entries WHERE packageName = ?1 AND activityName = ?2",
            params![self.package_name, self.activity_name],
        )?;
        tx.execute(
            "INSERT INTO lock_entries (packageName, activityName, lockCode, lockUntilTime,
                 ignoreUntilTime, isSystemApplication, whitelist)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.package_name,
                self.activity_name,
                self.lock_code,
                self.lock_until_time,
                self.ignore_until_time,
                self.is_system_application,
                self.whitelisted,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub fn find_exact(
        conn: &Connection,
        package_name: &str,
        activity_name: &str,
    ) -> Result<Option<Self>> {
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE packageName = ?1 AND activityName = ?2"),
            params![package_name, activity_name],
            Self::from_row,
        )
        .optional()
    }

    /// The exact row if present, else the package default row, else `None`.
    pub fn find_with_default(
        conn: &Connection,
        package_name: &str,
        activity_name: &str,
    ) -> Result<Option<Self>> {
        conn.query_row(
            &format!(
                "{SELECT_COLUMNS} WHERE packageName = ?1 AND activityName IN (?2, ?3)
                 ORDER BY CASE WHEN activityName = ?2 THEN 0 ELSE 1 END LIMIT 1"
            ),
            params![package_name, activity_name, PACKAGE_DEFAULT],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_package(conn: &Connection, package_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE packageName = ?1 ORDER BY activityName"
        ))?;
        let rows = stmt.query_map([package_name], Self::from_row)?;
        rows.collect()
    }

    pub fn find_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY packageName, activityName"
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }

    pub fn update_lock_time(
        conn: &Connection,
        lock_until_time: i64,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        conn.execute(
            "UPDATE lock_entries SET lockUntilTime = ?1 WHERE packageName = ?2 AND activityName = ?3",
            params![lock_until_time, package_name, activity_name],
        )
    }

    pub fn update_ignore_time(
        conn: &Connection,
        ignore_until_time: i64,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        conn.execute(
            "UPDATE lock_entries SET ignoreUntilTime = ?1 WHERE packageName = ?2 AND activityName = ?3",
            params![ignore_until_time, package_name, activity_name],
        )
    }

    pub fn update_whitelist(
        conn: &Connection,
        whitelisted: bool,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        conn.execute(
            "UPDATE lock_entries SET whitelist = ?1 WHERE packageName = ?2 AND activityName = ?3",
            params![whitelisted, package_name, activity_name],
        )
    }

    pub fn delete_by_package(conn: &Connection, package_name: &str) -> Result<usize> {
        conn.execute(
            "DELETE FROM lock_entries WHERE packageName = ?1",
            [package_name],
        )
    }

    pub fn delete_exact(
        conn: &Connection,
        package_name: &str,
        activity_name: &str,
    ) -> Result<usize> {
        conn.execute(
            "DELETE FROM lock_entries WHERE packageName = ?1 AND activityName = ?2",
            params![package_name, activity_name],
        )
    }

    pub fn delete_all(conn: &Connection) -> Result<usize> {
        conn.execute("DELETE FROM lock_entries", [])
    }
}
