use thiserror::Error;
use watchdesk_connector::SourceError;
use watchdesk_rules::RuleError;
use watchdesk_storage::StorageError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("rules error: {0}")]
    Rules(#[from] RuleError),

    #[error("all {failed} quote fetches failed, last error: {last}")]
    QuotesUnavailable { failed: usize, last: String },

    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("supervisor is already running")]
    AlreadyRunning,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// Short label used as the `error_class` log field.
    pub fn class(&self) -> &'static str {
        match self {
            JobError::Source(e) => e.class(),
            JobError::Storage(e) => e.class(),
            JobError::Rules(_) => "configuration",
            JobError::QuotesUnavailable { .. } => "upstream",
            JobError::UnknownJob(_) | JobError::AlreadyRunning => "supervisor",
            JobError::InvalidSchedule(_) => "configuration",
            JobError::Other(_) => "other",
        }
    }
}
