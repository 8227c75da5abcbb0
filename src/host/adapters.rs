//! Collaborator implementations backed by the messages the host process receives.

use crate::engine::{ActivityResolver, DeviceLockState, RecheckKey, RecheckScheduler};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Window classes that belong to dialogs, toasts and input methods rather
/// than full-screen activities.
const TRANSIENT_CLASS_MARKERS: &[&str] = &[
    "android.widget.",
    "android.app.Dialog",
    "android.app.AlertDialog",
    "android.inputmethodservice.",
    "android.view.",
    "PopupWindow",
];

/// Decides from the class name alone whether a window is a real activity.
pub struct WindowClassResolver {
    lock_screen_package: String,
}

impl WindowClassResolver {
    pub fn new(lock_screen_package: &str) -> Self {
        Self {
            lock_screen_package: lock_screen_package.to_string(),
        }
    }
}

impl ActivityResolver for WindowClassResolver {
    fn is_activity(&self, package_name: &str, class_name: &str) -> bool {
        if package_name.is_empty() || class_name.is_empty() {
            return false;
        }
        !TRANSIENT_CLASS_MARKERS
            .iter()
            .any(|marker| class_name.starts_with(marker) || class_name.ends_with(marker))
    }

    fn is_lock_screen_window(&self, package_name: &str, _class_name: &str) -> bool {
        package_name == self.lock_screen_package
    }
}

/// Last device lock state reported by the host.
#[derive(Default)]
pub struct DeviceLockFlag(AtomicBool);

impl DeviceLockFlag {
    pub fn set(&self, locked: bool) {
        self.0.store(locked, Ordering::SeqCst);
    }
}

impl DeviceLockState for DeviceLockFlag {
    fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Recheck timers kept in memory; the host drains due ones on each tick.
#[derive(Default)]
pub struct PendingRechecks(Mutex<HashMap<RecheckKey, i64>>);

impl PendingRechecks {
    fn lock(&self) -> MutexGuard<'_, HashMap<RecheckKey, i64>> {
        self.0.lock().unwrap_or_else(|poisoned| {
            warn!("Recheck table mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Remove and return every recheck due at or before `now`, earliest first.
    pub fn take_due(&self, now: i64) -> Vec<RecheckKey> {
        let mut pending = self.lock();
        let mut due: Vec<(RecheckKey, i64)> = pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (key.clone(), *at))
            .collect();
        for (key, _) in &due {
            pending.remove(key);
        }
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl RecheckScheduler for PendingRechecks {
    fn schedule(&self, key: &RecheckKey, at_time: i64) {
        debug!(
            "Recheck of {}/{} scheduled for {at_time}",
            key.package_name, key.class_name
        );
        self.lock().insert(key.clone(), at_time);
    }

    fn cancel(&self, key: &RecheckKey) {
        self.lock().remove(key);
    }
}
