//! # Record Envelope
//!
//! `Record<T>` wraps a domain payload with the synchronization metadata the
//! offline-first layer needs to track it: which id it carries, whether that
//! id is still locally minted, whether the last local state has reached the
//! remote authority, and how many pushes have failed since the last success.
//!
//! ## Record Lifecycle
//! ```text
//! created locally          hydrated from authority
//! is_local = true          is_local = false
//! is_synced = false        is_synced = true
//!       │                        │
//!       └───────────┬────────────┘
//!                   ▼
//!            mutated by a service call
//!            updated_at re-stamped, is_synced cleared
//!                   │
//!                   ▼
//!            push acknowledged by authority
//!            mark_synced: flags cleared, attempts reset,
//!            id rewritten if the authority issued one
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Identifier;

/// A domain entity plus its synchronization metadata.
///
/// The payload is flattened in the serialized form, so a persisted product
/// record reads as one JSON document:
/// `{ "id": ..., "is_local": ..., "name": ..., "batches": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    /// The record's one identifier (local or server-issued).
    pub id: Identifier,

    /// True until the remote authority has accepted the record.
    pub is_local: bool,

    /// True when the last known local state matches what was last
    /// successfully pushed. Never set optimistically.
    pub is_synced: bool,

    /// Failed push attempts since the last success.
    pub sync_attempts: u32,

    /// Re-stamped on every mutation.
    pub updated_at: DateTime<Utc>,

    /// The domain payload.
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Record<T> {
    /// Wraps a payload created locally while possibly offline.
    ///
    /// `is_synced` starts false unconditionally: a record may only claim to
    /// be synced after the authority's acknowledgment is confirmed.
    pub fn local(payload: T, now: DateTime<Utc>) -> Self {
        Record {
            id: Identifier::local(),
            is_local: true,
            is_synced: false,
            sync_attempts: 0,
            updated_at: now,
            payload,
        }
    }

    /// Wraps a payload received from the remote authority during hydration.
    pub fn hydrated(id: Identifier, payload: T, now: DateTime<Utc>) -> Self {
        Record {
            id,
            is_local: false,
            is_synced: true,
            sync_attempts: 0,
            updated_at: now,
            payload,
        }
    }

    /// Replaces the payload after a local mutation: `updated_at` re-stamped,
    /// `is_synced` cleared.
    pub fn apply_patch(&mut self, patch: T, now: DateTime<Utc>) {
        self.payload = patch;
        self.updated_at = now;
        self.is_synced = false;
    }

    /// Rewrites the identifier during reconciliation without touching the
    /// synced flag (used when newer local state is still queued).
    pub fn rewrite_id(&mut self, new_id: Identifier) {
        self.id = new_id;
        self.is_local = false;
    }

    /// Marks the record as accepted by the authority. If the authority
    /// issued a new id (Create acknowledgment), the id is rewritten.
    pub fn mark_synced(&mut self, new_id: Option<Identifier>) {
        if let Some(id) = new_id {
            self.id = id;
        }
        self.is_local = false;
        self.is_synced = true;
        self.sync_attempts = 0;
    }

    /// Records a failed push attempt.
    pub fn record_sync_attempt(&mut self) {
        self.sync_attempts = self.sync_attempts.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    fn note(body: &str) -> Note {
        Note {
            body: body.to_string(),
        }
    }

    #[test]
    fn local_records_start_unsynced() {
        let r = Record::local(note("hello"), Utc::now());
        assert!(r.id.is_local());
        assert!(r.is_local);
        assert!(!r.is_synced);
        assert_eq!(r.sync_attempts, 0);
    }

    #[test]
    fn hydrated_records_start_synced() {
        let r = Record::hydrated(Identifier::remote("n-1"), note("hi"), Utc::now());
        assert!(!r.is_local);
        assert!(r.is_synced);
    }

    #[test]
    fn patch_clears_synced_and_restamps() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let mut r = Record::hydrated(Identifier::remote("n-1"), note("hi"), t0);

        r.apply_patch(note("edited"), t1);

        assert_eq!(r.payload.body, "edited");
        assert_eq!(r.updated_at, t1);
        assert!(!r.is_synced);
    }

    #[test]
    fn mark_synced_rewrites_id_and_resets_attempts() {
        let mut r = Record::local(note("hi"), Utc::now());
        r.record_sync_attempt();
        r.record_sync_attempt();
        assert_eq!(r.sync_attempts, 2);

        r.mark_synced(Some(Identifier::remote("n-9")));

        assert_eq!(r.id, Identifier::remote("n-9"));
        assert!(!r.is_local);
        assert!(r.is_synced);
        assert_eq!(r.sync_attempts, 0);
    }

    #[test]
    fn rewrite_id_keeps_unsynced() {
        let mut r = Record::local(note("hi"), Utc::now());
        r.rewrite_id(Identifier::remote("n-3"));

        assert_eq!(r.id, Identifier::remote("n-3"));
        assert!(!r.is_local);
        assert!(!r.is_synced);
    }

    #[test]
    fn payload_serializes_flat() {
        let r = Record::hydrated(Identifier::remote("n-1"), note("hi"), Utc::now());
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["id"], "n-1");
        assert_eq!(json["body"], "hi");
        assert!(json.get("payload").is_none());
    }
}
