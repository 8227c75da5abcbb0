use crate::config::EngineConfig;
use crate::constants::{PREF_FAIL_ACTIVITY, PREF_FAIL_COUNT, PREF_FAIL_PACKAGE};
use crate::error::Result;
use crate::models::LockEntry;
use crate::store::EntryStore;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutOutcome {
    /// Failure recorded, still below the threshold
    Counted { fail_count: u32 },
    /// Threshold exceeded; the entry rejects every attempt until `until`
    HardLocked { until: i64 },
}

/// Counts consecutive wrong PINs against one entry and hard-locks that entry
/// once the count exceeds the configured threshold.
///
/// The count and the entry it belongs to are mirrored to the preferences
/// table so a restart does not wipe lockout progress. A failure against a
/// different entry starts a fresh count.
pub struct FailCountLockout {
    store: EntryStore,
    max_fail_count: u32,
    timeout_millis: i64,
    fail_count: u32,
    /// (package, activity) the current count was recorded against
    counted: Option<(String, String)>,
}

impl FailCountLockout {
    pub fn new(store: EntryStore, config: &EngineConfig) -> Result<Self> {
        let package = store.preference(PREF_FAIL_PACKAGE)?;
        let activity = store.preference(PREF_FAIL_ACTIVITY)?;
        let counted = package.zip(activity);
        let fail_count = match store.preference(PREF_FAIL_COUNT)? {
            Some(_) if counted.is_none() => 0,
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|e| {
                warn!("Ignoring unreadable fail count {raw:?}: {e}");
                0
            }),
            None => 0,
        };
        Ok(Self {
            store,
            max_fail_count: config.max_fail_count_before_lockout,
            timeout_millis: config.timeout_period_millis()?,
            fail_count,
            counted,
        })
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    fn counts_for(&self, entry: &LockEntry) -> bool {
        self.counted.as_ref().is_some_and(|(package, activity)| {
            *package == entry.package_name && *activity == entry.activity_name
        })
    }

    /// Record a wrong PIN for `entry`. Crossing the threshold bumps the
    /// entry's `lock_until_time` and starts a fresh count.
    pub fn record_failure(&mut self, entry: &LockEntry, now: i64) -> Result<LockoutOutcome> {
        let previous = if self.counts_for(entry) {
            self.fail_count
        } else {
            if self.fail_count > 0 {
                debug!(
                    "Fail count moves to {}/{}, starting over",
                    entry.package_name, entry.activity_name
                );
            }
            0
        };
        let fail_count = previous.saturating_add(1);
        if fail_count <= self.max_fail_count {
            self.persist(fail_count, Some(entry))?;
            return Ok(LockoutOutcome::Counted { fail_count });
        }

        let until = now.saturating_add(self.timeout_millis);
        let updated =
            self.store
                .update_lock_time(until, &entry.package_name, &entry.activity_name)?;
        if updated == 0 {
            warn!(
                "Hard lock target {}/{} no longer exists",
                entry.package_name, entry.activity_name
            );
        }
        info!(
            "Hard-locked {}/{} until {until} after {fail_count} failed attempts",
            entry.package_name, entry.activity_name
        );
        self.persist(0, None)?;
        Ok(LockoutOutcome::HardLocked { until })
    }

    pub fn reset(&mut self) -> Result<()> {
        if self.fail_count != 0 || self.counted.is_some() {
            self.persist(0, None)?;
        }
        Ok(())
    }

    fn persist(&mut self, fail_count: u32, entry: Option<&LockEntry>) -> Result<()> {
        let raw = fail_count.to_string();
        let package = entry.map(|e| e.package_name.as_str());
        let activity = entry.map(|e| e.activity_name.as_str());
        self.store.write_preferences(&[
            (PREF_FAIL_COUNT, Some(raw.as_str())),
            (PREF_FAIL_PACKAGE, package),
            (PREF_FAIL_ACTIVITY, activity),
        ])?;
        self.fail_count = fail_count;
        self.counted = entry.map(|e| (e.package_name.clone(), e.activity_name.clone()));
        Ok(())
    }
}
