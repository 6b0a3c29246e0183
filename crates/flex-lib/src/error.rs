//! Error types for the scoring library

use thiserror::Error;

/// Errors surfaced by the reconstruction, scoring and orchestration layers
#[derive(Debug, Error)]
pub enum FlexError {
    /// A time window was built with its start after its end
    #[error("invalid time window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },

    /// Component weights must add up to exactly one
    #[error("score weights must sum to 1.0, got {sum}")]
    InvalidWeights { sum: f64 },

    /// An audit record lacks a field its event kind requires
    #[error("malformed {event_name} event: {reason}")]
    MalformedEvent { event_name: String, reason: String },

    /// The caller is not part of an organization
    #[error("organizations are not in use for the caller account")]
    OrganizationsNotInUse,

    #[error("account directory error: {0}")]
    Directory(String),

    #[error("failed to obtain credentials for account {account_id}: {reason}")]
    Credentials { account_id: String, reason: String },

    #[error("audit log query failed: {0}")]
    AuditLog(String),

    /// A per-account worker failed; fatal for the run under the default policy
    #[error("fetching resources for account {account_id} failed: {source}")]
    AccountFetch {
        account_id: String,
        #[source]
        source: Box<FlexError>,
    },

    /// A per-account worker panicked or was aborted before joining
    #[error("account worker for {account_id} did not complete: {reason}")]
    WorkerJoin { account_id: String, reason: String },

    #[error("failed to publish metrics: {0}")]
    Publish(String),

    #[error("object storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlexError {
    pub fn malformed(event_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event_name: event_name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlexError>;
