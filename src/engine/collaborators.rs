//! Contracts the host fulfils for the decision engine.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Resolves whether a window belongs to a real activity.
pub trait ActivityResolver: Send + Sync {
    /// False for toasts, dialogs and other transient system windows.
    fn is_activity(&self, package_name: &str, class_name: &str) -> bool;
    fn is_lock_screen_window(&self, package_name: &str, class_name: &str) -> bool;
}

/// Identifies a window whose ignore period should be re-evaluated later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecheckKey {
    pub package_name: String,
    pub class_name: String,
}

impl RecheckKey {
    pub fn new(package_name: &str, class_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            class_name: class_name.to_string(),
        }
    }
}

pub trait RecheckScheduler: Send + Sync {
    /// Replace any pending recheck for `key` with one at `at_time` (epoch millis).
    fn schedule(&self, key: &RecheckKey, at_time: i64);
    fn cancel(&self, key: &RecheckKey);
}

pub trait DeviceLockState: Send + Sync {
    fn is_locked(&self) -> bool;
}

pub trait Clock: Send + Sync {
    /// Wall-clock time in epoch milliseconds.
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Everything the engine borrows from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn ActivityResolver>,
    pub scheduler: Arc<dyn RecheckScheduler>,
    pub device_lock: Arc<dyn DeviceLockState>,
    pub clock: Arc<dyn Clock>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
