//! Errors raised while loading or validating rule configuration.

/// Errors that can occur during rule loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Rule or market configuration rejected at load.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unparseable cron expression.
    #[error("invalid cron expression {expr:?}: {reason}")]
    Cron { expr: String, reason: String },

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
