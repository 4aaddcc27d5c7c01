//! Error types for a sync run.

use crate::edge::RemoteError;

/// Result alias used across the sync pipeline.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Every condition that aborts a sync run.
///
/// All variants are fatal for the current run. The source adapter is the
/// only component that swallows its own failures, and it reports them back
/// through [`crate::source::SourceFetch`] so the caller can raise
/// [`SyncError::SourceUnavailable`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("decision source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no entries to sync for {surface}")]
    NoEntries { surface: String },

    #[error("remote name mismatch: declared '{declared}', actual '{actual}'")]
    DriftMismatch { declared: String, actual: String },

    #[error("rule {rule_id} not found in ruleset {ruleset_id}")]
    RuleNotFound { ruleset_id: String, rule_id: String },

    #[error("refusing to install an empty WAF expression on rule {rule_id}")]
    EmptyExpression { rule_id: String },

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Config(msg.into())
    }
}
