//! Shared test utilities.
//!
//! Setup helpers for databases and stores, plus in-memory fakes for the
//! collaborators the decision engine borrows from its host.

#![cfg(test)]

use crate::config::EngineConfig;
use crate::db::{migrations, Database};
use crate::engine::{
    ActivityResolver, Clock, Collaborators, DeviceLockState, RecheckKey, RecheckScheduler,
};
use crate::store::EntryStore;
use crate::AppContext;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

/// Fixed starting point for `FixedClock`: 2024-01-01T00:00:00Z.
pub const TEST_EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Create a temporary test database with migrations applied.
///
/// The `TempDir` must outlive the database or the file is deleted underneath it.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

pub fn setup_test_store() -> (EntryStore, TempDir) {
    let (db, dir) = setup_test_db();
    (EntryStore::new(Arc::new(Mutex::new(db))), dir)
}

pub fn setup_test_context(config: EngineConfig) -> (AppContext, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let context =
        AppContext::open(&dir.path().join("test.db"), config).expect("Failed to open context");
    (context, dir)
}

/// Clock that only moves when told to.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now()
    }
}

/// Remembers the latest schedule per key.
#[derive(Default)]
pub struct RecordingScheduler(Mutex<HashMap<RecheckKey, i64>>);

impl RecordingScheduler {
    pub fn scheduled(&self, key: &RecheckKey) -> Option<i64> {
        self.0.lock().expect("scheduler lock").get(key).copied()
    }
}

impl RecheckScheduler for RecordingScheduler {
    fn schedule(&self, key: &RecheckKey, at_time: i64) {
        self.0.lock().expect("scheduler lock").insert(key.clone(), at_time);
    }

    fn cancel(&self, key: &RecheckKey) {
        self.0.lock().expect("scheduler lock").remove(key);
    }
}

/// Treats every window as an activity unless marked otherwise. Windows of
/// the configured lock screen package count as the lock screen.
#[derive(Default)]
pub struct StaticResolver(Mutex<HashSet<(String, String)>>);

impl StaticResolver {
    pub fn mark_not_activity(&self, package_name: &str, class_name: &str) {
        self.0
            .lock()
            .expect("resolver lock")
            .insert((package_name.to_string(), class_name.to_string()));
    }
}

impl ActivityResolver for StaticResolver {
    fn is_activity(&self, package_name: &str, class_name: &str) -> bool {
        !self
            .0
            .lock()
            .expect("resolver lock")
            .contains(&(package_name.to_string(), class_name.to_string()))
    }

    fn is_lock_screen_window(&self, package_name: &str, _class_name: &str) -> bool {
        package_name == EngineConfig::default().lock_screen_package
    }
}

#[derive(Default)]
pub struct FakeDeviceLock(AtomicBool);

impl FakeDeviceLock {
    pub fn set(&self, locked: bool) {
        self.0.store(locked, Ordering::SeqCst);
    }
}

impl DeviceLockState for FakeDeviceLock {
    fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bundle of fakes; keep it around to steer the engine from a test.
pub struct TestHost {
    pub clock: Arc<FixedClock>,
    pub scheduler: Arc<RecordingScheduler>,
    pub resolver: Arc<StaticResolver>,
    pub device_lock: Arc<FakeDeviceLock>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(FixedClock(AtomicI64::new(TEST_EPOCH_MILLIS))),
            scheduler: Arc::new(RecordingScheduler::default()),
            resolver: Arc::new(StaticResolver::default()),
            device_lock: Arc::new(FakeDeviceLock::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: Arc::<StaticResolver>::clone(&self.resolver),
            scheduler: Arc::<RecordingScheduler>::clone(&self.scheduler),
            device_lock: Arc::<FakeDeviceLock>::clone(&self.device_lock),
            clock: Arc::<FixedClock>::clone(&self.clock),
        }
    }
}
