//! # Sync Error Types
//!
//! Error taxonomy for the sync layer, categorized by how each failure is
//! handled:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────────┐
//! │ Network, Timeout │ retried with backoff up to max_attempts, then    │
//! │                  │ Abandoned ("sync failed, will retry")            │
//! │ Unauthorized     │ never retried, immediately Abandoned - token     │
//! │                  │ refresh is an external collaborator's job        │
//! │ RemoteRejected   │ 4xx validation rejection, immediately Abandoned  │
//! │ Validation,      │ returned synchronously from the service, never   │
//! │ Deduction        │ queued, never retried                            │
//! │ Store            │ surfaced immediately, no silent data loss        │
//! │ Internal         │ engine bug (e.g. reconciliation failure),        │
//! │                  │ logged loudly, drain aborted                     │
//! └──────────────────┴──────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use stockline_core::error::{DeductionError, ValidationError};
use stockline_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync layer errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failed: connection refused, DNS, 5xx from the authority.
    #[error("network error: {0}")]
    Network(String),

    /// The bounded per-request timeout elapsed. Treated as a network error
    /// for retry purposes.
    #[error("request timed out")]
    Timeout,

    /// 401 from the authority. Not retryable here.
    #[error("authority rejected credentials")]
    Unauthorized,

    /// Any other 4xx: the authority rejected the document itself.
    #[error("authority rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The authority URL could not be parsed or extended.
    #[error("invalid authority URL: {0}")]
    InvalidUrl(String),

    /// A request or response body could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Sync configuration could not be loaded.
    #[error("failed to load sync config: {0}")]
    ConfigLoadFailed(String),

    /// Sync configuration is structurally valid but nonsensical.
    #[error("invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// The persistence layer failed underneath the sync layer.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A service-level payload failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A deduction request was rejected by the engine.
    #[error(transparent)]
    Deduction(#[from] DeductionError),

    /// Engine invariant violated - unrecoverable without manual
    /// intervention.
    #[error("internal sync error: {0}")]
    Internal(String),

    /// The engine is shutting down and no longer accepts work.
    #[error("sync engine is shutting down")]
    ShuttingDown,
}

impl SyncError {
    /// True if the failed push may be retried with backoff.
    ///
    /// Everything else is terminal for the queue item: either a
    /// business-level rejection (4xx, 401) or a local fault retrying
    /// cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_categorization() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout.is_retryable());

        assert!(!SyncError::Unauthorized.is_retryable());
        assert!(!SyncError::RemoteRejected {
            status: 422,
            message: "bad sku".into()
        }
        .is_retryable());
        assert!(!SyncError::Internal("oops".into()).is_retryable());
        assert!(!SyncError::ShuttingDown.is_retryable());
    }

    #[test]
    fn store_errors_convert() {
        let err: SyncError = StoreError::StorageFull.into();
        assert!(matches!(err, SyncError::Store(StoreError::StorageFull)));
        assert!(!err.is_retryable());
    }
}
