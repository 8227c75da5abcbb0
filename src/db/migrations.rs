use super::schema::{LOCK_ENTRIES, LOCK_ENTRIES_V2, PREFERENCES};
use crate::constants::SCHEMA_VERSION;
use log::info;
use rusqlite::{params, Connection, Result};

type MigrationFn = fn(&Connection) -> Result<()>;

/// Ordered upgrade chain for databases created by older releases.
const MIGRATIONS: &[(i32, &str, MigrationFn)] = &[
    (1, "drop displayName column", drop_display_name),
    (2, "recreate lock_entries", recreate_lock_entries),
    (3, "add whitelist column", add_whitelist),
];

pub fn run(conn: &Connection) -> Result<()> {
    let version = user_version(conn)?;

    if version == 0 && !table_exists(conn, "lock_entries")? {
        conn.execute_batch(LOCK_ENTRIES)?;
        set_user_version(conn, SCHEMA_VERSION)?;
    } else {
        for (target, description, migrate) in MIGRATIONS {
            if version >= *target {
                continue;
            }
            info!("Migrating lock_entries to version {target}: {description}");
            let tx = conn.unchecked_transaction()?;
            migrate(&tx)?;
            set_user_version(&tx, *target)?;
            tx.commit()?;
        }
    }

    conn.execute_batch(PREFERENCES)?;
    Ok(())
}

pub fn user_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn set_user_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn drop_display_name(conn: &Connection) -> Result<()> {
    if column_exists(conn, "lock_entries", "displayName")? {
        conn.execute_batch("ALTER TABLE lock_entries DROP COLUMN displayName")?;
    }
    Ok(())
}

fn recreate_lock_entries(conn: &Connection) -> Result<()> {
    conn.execute_batch("DROP TABLE IF EXISTS lock_entries")?;
    conn.execute_batch(LOCK_ENTRIES_V2)
}

fn add_whitelist(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "lock_entries", "whitelist")? {
        conn.execute_batch(
            "ALTER TABLE lock_entries ADD COLUMN whitelist INTEGER NOT NULL DEFAULT 0",
        )?;
    }
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_lock_entries_package ON lock_entries(packageName)",
    )
}
