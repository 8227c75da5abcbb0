//! Lock decision state machine.
//!
//! Each window event re-enters the machine from `Idle`, runs a chain of
//! short-circuiting guards and ends in `Challenge` or `Suppressed`. A correct
//! PIN for the pending challenge moves it to `Pass`.

pub mod cancel;
pub mod collaborators;
pub mod service;

pub use cancel::CancellationToken;
pub use collaborators::{
    ActivityResolver, Clock, Collaborators, DeviceLockState, RecheckKey, RecheckScheduler,
    SystemClock,
};
pub use service::{Completion, LockService};

use crate::config::EngineConfig;
use crate::credential::CredentialVerifier;
use crate::error::{AppError, Result};
use crate::lockout::{FailCountLockout, LockoutOutcome};
use crate::models::LockEntry;
use crate::store::EntryStore;
use crate::validation::validate_period_minutes;
use crate::window::{WindowEvent, WindowEventNormalizer, WindowState};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Evaluating,
    Challenge,
    Pass,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    ServiceDisabled,
    NotAnActivity,
    LockScreenWindow,
    WindowUnchanged,
    NotLocked,
    Ignored,
    Whitelisted,
    NotForeground,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Show the PIN screen for this entry
    Challenge(LockEntry),
    Suppressed(SuppressReason),
}

/// What to do with the entry once the correct PIN is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostUnlock {
    Nothing,
    /// Whitelist the concrete activity that was showing
    Whitelist,
    /// Skip challenges for this entry for a while
    Ignore { minutes: i64 },
    /// Delete the entry altogether
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked,
    WrongPin { fail_count: u32 },
    /// Rejected on time alone; the PIN was not compared
    LockedOut { until: i64 },
    NoPendingChallenge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingChallenge {
    entry: LockEntry,
    /// Class name of the window that triggered the challenge
    real_name: String,
}

pub struct LockDecisionEngine {
    config: EngineConfig,
    store: EntryStore,
    verifier: CredentialVerifier,
    lockout: FailCountLockout,
    normalizer: WindowEventNormalizer,
    collaborators: Collaborators,
    state: EngineState,
    pending: Option<PendingChallenge>,
}

impl LockDecisionEngine {
    pub fn new(
        config: EngineConfig,
        store: EntryStore,
        verifier: CredentialVerifier,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        let lockout = FailCountLockout::new(store.clone(), &config)?;
        let normalizer = WindowEventNormalizer::new(config.lock_on_package_change_only);
        Ok(Self {
            config,
            store,
            verifier,
            lockout,
            normalizer,
            collaborators,
            state: EngineState::Idle,
            pending: None,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn window_state(&self) -> &WindowState {
        self.normalizer.state()
    }

    pub fn fail_count(&self) -> u32 {
        self.lockout.fail_count()
    }

    pub fn pending_entry(&self) -> Option<&LockEntry> {
        self.pending.as_ref().map(|p| &p.entry)
    }

    /// The post-unlock choice used when the host does not pick one.
    pub fn default_post_unlock(&self) -> PostUnlock {
        if self.config.default_ignore_minutes > 0 {
            PostUnlock::Ignore {
                minutes: self.config.default_ignore_minutes,
            }
        } else {
            PostUnlock::Nothing
        }
    }

    pub fn evaluate(&mut self, event: &WindowEvent) -> Result<Decision> {
        self.evaluate_with(event, &CancellationToken::new())
    }

    pub fn evaluate_with(
        &mut self,
        event: &WindowEvent,
        token: &CancellationToken,
    ) -> Result<Decision> {
        self.state = EngineState::Evaluating;
        let result = self.run_guards(event, token);
        self.state = match &result {
            Ok(Decision::Challenge(_)) => EngineState::Challenge,
            Ok(Decision::Suppressed(_)) => EngineState::Suppressed,
            Err(_) => EngineState::Idle,
        };
        result
    }

    /// Re-evaluate a window once its ignore period has run out, provided it
    /// is still in the foreground.
    pub fn recheck(&mut self, key: &RecheckKey) -> Result<Decision> {
        let window = self.normalizer.state();
        if window.last_package_name != key.package_name
            || window.last_class_name != key.class_name
        {
            debug!(
                "Skipping recheck for {}/{}: no longer foreground",
                key.package_name, key.class_name
            );
            return Ok(Decision::Suppressed(SuppressReason::NotForeground));
        }
        self.evaluate(&WindowEvent::forced(&key.package_name, &key.class_name))
    }

    fn run_guards(&mut self, event: &WindowEvent, token: &CancellationToken) -> Result<Decision> {
        let package_name = event.package_name.as_str();
        let class_name = event.class_name.as_str();

        if !self.verifier.has_master_pin()? {
            debug!("No master PIN, lock service disabled");
            self.normalizer.reset();
            self.pending = None;
            return Ok(Decision::Suppressed(SuppressReason::ServiceDisabled));
        }

        if self.config.lock_only_when_device_locked && self.collaborators.device_lock.is_locked() {
            debug!("Device is locked, forgetting last window");
            self.normalizer.reset();
        }

        if token.is_cancelled() {
            return Ok(Decision::Suppressed(SuppressReason::Cancelled));
        }

        if !self.collaborators.resolver.is_activity(package_name, class_name) {
            return Ok(Decision::Suppressed(SuppressReason::NotAnActivity));
        }

        if self
            .collaborators
            .resolver
            .is_lock_screen_window(package_name, class_name)
        {
            return Ok(Decision::Suppressed(SuppressReason::LockScreenWindow));
        }

        if !self.normalizer.observe(event) {
            return Ok(Decision::Suppressed(SuppressReason::WindowUnchanged));
        }

        self.normalizer.set_lock_screen_passed(false);
        self.pending = None;
        let entry = self
            .store
            .query_with_default_fallback(package_name, class_name)?;

        if token.is_cancelled() {
            return Ok(Decision::Suppressed(SuppressReason::Cancelled));
        }

        if entry.is_empty() {
            return Ok(Decision::Suppressed(SuppressReason::NotLocked));
        }

        let now = self.collaborators.clock.now_millis();
        if entry.is_ignored(now) {
            debug!("{package_name}/{class_name} ignored until {}", entry.ignore_until_time);
            return Ok(Decision::Suppressed(SuppressReason::Ignored));
        }

        if entry.is_package_default() && entry.whitelisted {
            error!(
                "Whitelisted package default found for {}, refusing to evaluate",
                entry.package_name
            );
            return Err(AppError::DataIntegrityViolation {
                package_name: entry.package_name,
                activity_name: entry.activity_name,
            });
        }

        if entry.whitelisted {
            return Ok(Decision::Suppressed(SuppressReason::Whitelisted));
        }

        debug!("Challenging {package_name}/{class_name} via {}", entry.activity_name);
        self.pending = Some(PendingChallenge {
            entry: entry.clone(),
            real_name: event.class_name.clone(),
        });
        Ok(Decision::Challenge(entry))
    }

    /// Answer the pending challenge.
    ///
    /// A hard-locked entry rejects every attempt before the PIN is compared.
    pub fn submit_pin(&mut self, attempt: &str, choice: PostUnlock) -> Result<UnlockOutcome> {
        let Some(pending) = self.pending.clone() else {
            return Ok(UnlockOutcome::NoPendingChallenge);
        };
        let ignore_millis = match choice {
            PostUnlock::Ignore { minutes } => validate_period_minutes("ignoreMinutes", minutes)?,
            PostUnlock::Nothing | PostUnlock::Whitelist | PostUnlock::Exclude => 0,
        };
        let now = self.collaborators.clock.now_millis();

        // Re-read so a hard lock written after the challenge is honoured
        let entry = self
            .store
            .query_exact(&pending.entry.package_name, &pending.entry.activity_name)?
            .unwrap_or(pending.entry);

        if entry.is_hard_locked(now) {
            return Ok(UnlockOutcome::LockedOut {
                until: entry.lock_until_time,
            });
        }

        if !self.verifier.verify_for_entry(&entry, attempt)? {
            return Ok(match self.lockout.record_failure(&entry, now)? {
                LockoutOutcome::Counted { fail_count } => UnlockOutcome::WrongPin { fail_count },
                LockoutOutcome::HardLocked { until } => UnlockOutcome::LockedOut { until },
            });
        }

        self.lockout.reset()?;
        self.apply_post_unlock(&entry, &pending.real_name, choice, now, ignore_millis)?;
        self.normalizer.set_lock_screen_passed(true);
        self.pending = None;
        self.state = EngineState::Pass;
        info!("Unlocked {}/{}", entry.package_name, pending.real_name);
        Ok(UnlockOutcome::Unlocked)
    }

    fn apply_post_unlock(
        &self,
        entry: &LockEntry,
        real_name: &str,
        choice: PostUnlock,
        now: i64,
        ignore_millis: i64,
    ) -> Result<()> {
        let key = RecheckKey::new(&entry.package_name, real_name);
        let scheduler = &self.collaborators.scheduler;
        match choice {
            PostUnlock::Ignore { .. } if ignore_millis > 0 => {
                let until = now.saturating_add(ignore_millis);
                self.store
                    .update_ignore_time(until, &entry.package_name, &entry.activity_name)?;
                scheduler.schedule(&key, until);
            }
            PostUnlock::Whitelist => {
                self.store.set_whitelisted(
                    &entry.package_name,
                    real_name,
                    true,
                    entry.is_system_application,
                )?;
                scheduler.cancel(&key);
            }
            PostUnlock::Exclude => {
                self.store
                    .delete_by_package_activity(&entry.package_name, &entry.activity_name)?;
                scheduler.cancel(&key);
            }
            PostUnlock::Ignore { .. } | PostUnlock::Nothing => scheduler.cancel(&key),
        }
        Ok(())
    }
}
