// src/constants.rs

/// Reserved activity name for a package-wide lock entry
pub const PACKAGE_DEFAULT: &str = "PACKAGE_DEFAULT";

/// Milliseconds in one minute (60 * 1000)
pub const MILLIS_PER_MINUTE: i64 = 60_000;

/// Minutes an entry stays hard-locked after too many bad PINs
pub const DEFAULT_TIMEOUT_PERIOD_MINUTES: i64 = 5;

/// Wrong PINs tolerated before the hard lock kicks in
pub const DEFAULT_MAX_FAIL_COUNT: u32 = 2;

/// Maximum grace or timeout period in minutes (24 hours)
pub const MAX_PERIOD_MINUTES: i64 = 24 * 60;

/// Maximum PIN length
pub const MAX_PIN_LEN: usize = 64;

/// Maximum hint length
pub const MAX_HINT_LEN: usize = 200;

/// Latest lock_entries schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Preference keys
pub const PREF_MASTER_PIN: &str = "master_pin";
pub const PREF_HINT: &str = "hint";
pub const PREF_FAIL_COUNT: &str = "fail_count";
pub const PREF_FAIL_PACKAGE: &str = "fail_package";
pub const PREF_FAIL_ACTIVITY: &str = "fail_activity";

/// Host messages are capped at 1MB (1024 * 1024 bytes)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
