use crate::constants::{DEFAULT_MAX_FAIL_COUNT, DEFAULT_TIMEOUT_PERIOD_MINUTES};
use crate::error::{AppError, Result};
use crate::validation::validate_period_minutes;
use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Read-only knobs consumed by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Hard-lock duration after too many wrong PINs
    pub timeout_period_minutes: i64,
    /// Grace period offered after a successful unlock; 0 means none
    pub default_ignore_minutes: i64,
    /// Only re-challenge when the foreground package changes
    pub lock_on_package_change_only: bool,
    pub max_fail_count_before_lockout: u32,
    /// Forget the current window whenever the device itself locks
    pub lock_only_when_device_locked: bool,
    /// Package that renders the lock screen, never challenged itself
    pub lock_screen_package: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_period_minutes: DEFAULT_TIMEOUT_PERIOD_MINUTES,
            default_ignore_minutes: 0,
            lock_on_package_change_only: false,
            max_fail_count_before_lockout: DEFAULT_MAX_FAIL_COUNT,
            lock_only_when_device_locked: false,
            lock_screen_package: "com.applock".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_period_minutes < 1 {
            return Err(AppError::InvalidInput {
                field: "timeoutPeriodMinutes",
                reason: "must be at least 1".into(),
            });
        }
        validate_period_minutes("timeoutPeriodMinutes", self.timeout_period_minutes)?;
        validate_period_minutes("defaultIgnoreMinutes", self.default_ignore_minutes)?;
        if self.max_fail_count_before_lockout < 1 {
            return Err(AppError::InvalidInput {
                field: "maxFailCountBeforeLockout",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn timeout_period_millis(&self) -> Result<i64> {
        validate_period_minutes("timeoutPeriodMinutes", self.timeout_period_minutes)
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "applock", "AppLock")
        .ok_or_else(|| AppError::Internal("Could not determine project directories".into()))
}

/// Get the config path, creating the config directory if needed.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let config_dir = dirs.config_dir();
    std::fs::create_dir_all(config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Get the database path, creating the data directory if needed.
pub fn default_db_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("applock.db"))
}
