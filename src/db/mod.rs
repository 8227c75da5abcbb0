pub mod helpers;
pub mod migrations;
pub mod schema;
pub use helpers::{lock_db, with_connection};

use log::info;
use rusqlite::Connection;
use std::io;
use std::path::{Path, PathBuf};

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drops the backing file (or every table for in-memory databases) and
    /// rebuilds the schema from scratch.
    pub fn recreate(&mut self) -> crate::error::Result<()> {
        if let Some(path) = self.path.clone() {
            let placeholder = Connection::open_in_memory()?;
            let old = std::mem::replace(&mut self.conn, placeholder);
            if let Err((conn, e)) = old.close() {
                self.conn = conn;
                return Err(e.into());
            }

            for file in [path.clone(), wal_path(&path, "-wal"), wal_path(&path, "-shm")] {
                if let Err(e) = std::fs::remove_file(&file) {
                    if e.kind() != io::ErrorKind::NotFound {
                        return Err(e.into());
                    }
                }
            }

            self.conn = Connection::open(&path)?;
            info!("Recreated lock database at {}", path.display());
        } else {
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS lock_entries;
                 DROP TABLE IF EXISTS preferences;
                 PRAGMA user_version = 0;",
            )?;
        }

        migrations::run(&self.conn)?;
        Ok(())
    }
}

fn wal_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
