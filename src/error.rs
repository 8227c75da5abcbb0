use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid entry: {reason}")]
    InvalidEntry { reason: &'static str },

    #[error("Invalid key: package and activity names must not be empty")]
    InvalidKey,

    #[error("Data integrity violation: {package_name}/{activity_name} is a whitelisted package default")]
    DataIntegrityViolation {
        package_name: String,
        activity_name: String,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether the host may recover by re-prompting or retrying.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidEntry { .. }
            | Self::InvalidKey
            | Self::InvalidInput { .. }
            | Self::Database(_)
            | Self::Io(_) => true,
            Self::DataIntegrityViolation { .. }
            | Self::Config(_)
            | Self::LockPoisoned
            | Self::Internal(_) => false,
        }
    }
}
