// src/db/helpers.rs

use crate::db::Database;
use crate::error::{AppError, Result};
use log::{error, warn};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Lock the shared database, recovering from poisoning.
///
/// A panic in one caller must not take the lock screen down with it, so a
/// poisoned mutex is logged and reused.
pub fn lock_db(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    match db.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Database mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Execute a database operation with lock handling and error logging.
///
/// # Example
/// ```ignore
/// with_connection(&db, "query all entries", |conn| LockEntry::find_all(conn))
/// ```
pub fn with_connection<F, T>(db: &Mutex<Database>, operation: &str, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
{
    let db = lock_db(db);
    f(db.connection()).map_err(|e| {
        error!("Failed to {operation}: {e}");
        AppError::Database(e)
    })
}
