pub const LOCK_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS lock_entries (
    packageName TEXT NOT NULL,
    activityName TEXT NOT NULL,
    lockCode TEXT,
    lockUntilTime INTEGER NOT NULL DEFAULT 0,
    ignoreUntilTime INTEGER NOT NULL DEFAULT 0,
    isSystemApplication INTEGER NOT NULL DEFAULT 0,
    whitelist INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (packageName, activityName)
);

CREATE INDEX IF NOT EXISTS idx_lock_entries_package ON lock_entries(packageName);
"#;

/// Table layout written by the version 2 migration, before `whitelist` existed.
pub const LOCK_ENTRIES_V2: &str = r#"
CREATE TABLE IF NOT EXISTS lock_entries (
    packageName TEXT NOT NULL,
    activityName TEXT NOT NULL,
    lockCode TEXT,
    lockUntilTime INTEGER NOT NULL DEFAULT 0,
    ignoreUntilTime INTEGER NOT NULL DEFAULT 0,
    isSystemApplication INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (packageName, activityName)
);
"#;

pub const PREFERENCES: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
