//! # Store Error Types
//!
//! Errors raised by the persistence layer. All of them surface
//! synchronously to the caller; none are swallowed.

use stockline_core::types::SyncState;
use thiserror::Error;

use crate::medium::MediumError;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record or queue item does not exist.
    ///
    /// Indicates caller/engine disagreement on identity - a programming
    /// error, logged loudly at the raise site.
    #[error("{entity} not found in {collection}: {id}")]
    NotFound {
        entity: &'static str,
        collection: String,
        id: String,
    },

    /// The backing medium rejected the write. Fatal for the attempted
    /// write; the in-memory snapshot is left unchanged.
    #[error("backing storage is full")]
    StorageFull,

    /// The medium failed for a reason other than capacity.
    #[error("storage medium failed: {0}")]
    Medium(String),

    /// A blob could not be serialized or deserialized. Fatal for the
    /// attempted operation; nothing is partially written.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A queue item was asked to move backwards or out of a terminal
    /// state. The transition is refused and the item left untouched.
    #[error("illegal sync state transition: {from} -> {to}")]
    InvalidTransition { from: SyncState, to: SyncState },
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            entity,
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<MediumError> for StoreError {
    fn from(err: MediumError) -> Self {
        match err {
            MediumError::Full => StoreError::StorageFull,
            MediumError::Io(msg) => StoreError::Medium(msg),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_full_maps_to_storage_full() {
        let err: StoreError = MediumError::Full.into();
        assert!(matches!(err, StoreError::StorageFull));
    }

    #[test]
    fn transition_error_message() {
        let err = StoreError::InvalidTransition {
            from: SyncState::Synced,
            to: SyncState::Pending,
        };
        assert_eq!(err.to_string(), "illegal sync state transition: synced -> pending");
    }
}
