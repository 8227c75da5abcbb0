use crate::constants::{MAX_HINT_LEN, MAX_PERIOD_MINUTES, MAX_PIN_LEN, MILLIS_PER_MINUTE};
use crate::error::AppError;
use crate::models::LockEntry;

/// Reject the empty sentinel and whitelisted package defaults before they reach the table.
pub fn validate_entry(entry: &LockEntry) -> Result<(), AppError> {
    if entry.is_empty() {
        return Err(AppError::InvalidEntry {
            reason: "package and activity names must not be empty",
        });
    }
    if entry.is_package_default() && entry.whitelisted {
        return Err(AppError::InvalidEntry {
            reason: "a package default entry cannot be whitelisted",
        });
    }
    Ok(())
}

/// Validate the (package, activity) key of an in-place update.
pub fn validate_key(package_name: &str, activity_name: &str) -> Result<(), AppError> {
    if package_name.is_empty() || activity_name.is_empty() {
        return Err(AppError::InvalidKey);
    }
    Ok(())
}

/// Validate a grace or timeout period in minutes.
/// Returns Ok(millis) if valid.
pub fn validate_period_minutes(field: &'static str, minutes: i64) -> Result<i64, AppError> {
    if minutes < 0 {
        return Err(AppError::InvalidInput {
            field,
            reason: "cannot be negative".into(),
        });
    }
    if minutes > MAX_PERIOD_MINUTES {
        return Err(AppError::InvalidInput {
            field,
            reason: format!("cannot exceed {MAX_PERIOD_MINUTES} minutes"),
        });
    }
    Ok(minutes * MILLIS_PER_MINUTE)
}

/// Validate a PIN before it is hashed and stored.
pub fn validate_pin(pin: &str) -> Result<&str, AppError> {
    if pin.is_empty() {
        return Err(AppError::InvalidInput {
            field: "pin",
            reason: "cannot be empty".into(),
        });
    }
    if pin.chars().count() > MAX_PIN_LEN {
        return Err(AppError::InvalidInput {
            field: "pin",
            reason: format!("cannot exceed {MAX_PIN_LEN} characters"),
        });
    }
    Ok(pin)
}

/// Validate an optional hint. Blank hints become `None`.
pub fn validate_hint(hint: Option<&str>) -> Result<Option<&str>, AppError> {
    let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    if hint.chars().count() > MAX_HINT_LEN {
        return Err(AppError::InvalidInput {
            field: "hint",
            reason: format!("cannot exceed {MAX_HINT_LEN} characters"),
        });
    }
    Ok(Some(hint))
}
