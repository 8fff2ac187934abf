//! # Record Store
//!
//! A generic, collection-keyed store of typed records with synchronization
//! metadata. One `RecordStore<T>` instance owns one collection; the
//! collection name is fixed at open time and doubles as the persisted blob
//! key.
//!
//! ## Atomicity
//! ```text
//! mutate ──► clone snapshot ──► apply change ──► persist blob ──► commit
//!                                                    │
//!                                              write fails?
//!                                                    │
//!                                     snapshot unchanged, error returned
//! ```
//! Writers are serialized on the collection's lock; readers take whole
//! snapshots. A reader can never observe a half-written collection.
//!
//! The store owns no network knowledge: queueing the remote side of a
//! mutation is the caller's job.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

use stockline_core::clock::Clock;
use stockline_core::id::Identifier;
use stockline_core::record::Record;
use stockline_core::types::CollectionName;

use crate::error::{StoreError, StoreResult};
use crate::medium::StorageMedium;

/// Local store for one collection of `Record<T>`.
pub struct RecordStore<T> {
    collection: CollectionName,
    medium: Arc<dyn StorageMedium>,
    clock: Arc<dyn Clock>,
    records: RwLock<Vec<Record<T>>>,
}

impl<T> RecordStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Opens the store for `collection`, loading any persisted snapshot.
    pub fn open(
        collection: CollectionName,
        medium: Arc<dyn StorageMedium>,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let records = match medium.read(collection.as_str())? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };

        debug!(collection = %collection, count = records.len(), "opened record store");

        Ok(RecordStore {
            collection,
            medium,
            clock,
            records: RwLock::new(records),
        })
    }

    /// The collection this store owns.
    pub fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Returns the full snapshot. Never blocks on network.
    pub fn get(&self) -> Vec<Record<T>> {
        self.records.read().expect("record lock poisoned").clone()
    }

    /// Looks up a single record by id.
    pub fn find(&self, id: &Identifier) -> Option<Record<T>> {
        self.records
            .read()
            .expect("record lock poisoned")
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    /// True if a record with `id` exists in the snapshot.
    pub fn contains(&self, id: &Identifier) -> bool {
        self.records
            .read()
            .expect("record lock poisoned")
            .iter()
            .any(|r| &r.id == id)
    }

    /// Replaces the collection snapshot atomically (bulk hydration).
    pub fn put_all(&self, records: Vec<Record<T>>) -> StoreResult<()> {
        let mut guard = self.records.write().expect("record lock poisoned");
        self.persist(&records)?;
        debug!(collection = %self.collection, count = records.len(), "replaced snapshot");
        *guard = records;
        Ok(())
    }

    /// Replaces the snapshot with records hydrated from authority documents.
    ///
    /// Each document must carry an `id` field; the rest deserializes into
    /// the domain payload. Hydrated records are born synced.
    pub fn hydrate(&self, documents: Vec<serde_json::Value>) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut records = Vec::with_capacity(documents.len());

        for document in documents {
            let id = document
                .get("id")
                .and_then(|v| v.as_str())
                .map(Identifier::remote)
                .ok_or_else(|| {
                    StoreError::Serialization("authority document missing id".to_string())
                })?;
            let payload: T = serde_json::from_value(document)?;
            records.push(Record::hydrated(id, payload, now));
        }

        let count = records.len();
        self.put_all(records)?;
        Ok(count)
    }

    /// Creates a record locally: mints a local id, stamps metadata, appends.
    ///
    /// On a medium failure the collection is left unchanged.
    pub fn add(&self, payload: T) -> StoreResult<Record<T>> {
        let record = Record::local(payload, self.clock.now());

        let mut guard = self.records.write().expect("record lock poisoned");
        let mut next = guard.clone();
        next.push(record.clone());

        self.persist(&next)?;
        debug!(collection = %self.collection, id = %record.id, "added record");
        *guard = next;
        Ok(record)
    }

    /// Merges `patch` into the record's payload: `updated_at` re-stamped,
    /// `is_synced` cleared.
    pub fn update(&self, id: &Identifier, patch: T) -> StoreResult<Record<T>> {
        let now = self.clock.now();

        let mut guard = self.records.write().expect("record lock poisoned");
        let mut next = guard.clone();

        let record = Self::find_mut(&mut next, &self.collection, id)?;
        record.apply_patch(patch, now);
        let updated = record.clone();

        self.persist(&next)?;
        debug!(collection = %self.collection, id = %id, "updated record");
        *guard = next;
        Ok(updated)
    }

    /// Removes the record from the snapshot. Queueing the remote delete is
    /// the caller's responsibility.
    pub fn delete(&self, id: &Identifier) -> StoreResult<()> {
        let mut guard = self.records.write().expect("record lock poisoned");

        if !guard.iter().any(|r| &r.id == id) {
            error!(collection = %self.collection, id = %id, "delete target not found");
            return Err(StoreError::not_found("record", self.collection.as_str(), id.as_str()));
        }

        let next: Vec<Record<T>> = guard.iter().filter(|r| &r.id != id).cloned().collect();

        self.persist(&next)?;
        debug!(collection = %self.collection, id = %id, "deleted record");
        *guard = next;
        Ok(())
    }

    /// Marks the record as accepted by the authority, rewriting its id if
    /// the authority issued one (identifier reconciliation, store side).
    pub fn mark_synced(&self, id: &Identifier, new_id: Option<Identifier>) -> StoreResult<Record<T>> {
        let mut guard = self.records.write().expect("record lock poisoned");
        let mut next = guard.clone();

        let record = Self::find_mut(&mut next, &self.collection, id)?;
        record.mark_synced(new_id);
        let updated = record.clone();

        self.persist(&next)?;
        debug!(collection = %self.collection, id = %id, new_id = %updated.id, "marked record synced");
        *guard = next;
        Ok(updated)
    }

    /// Rewrites the record's id without claiming it is synced - used when a
    /// Create is acknowledged while newer local state is still queued.
    pub fn rewrite_id(&self, id: &Identifier, new_id: Identifier) -> StoreResult<Record<T>> {
        let mut guard = self.records.write().expect("record lock poisoned");
        let mut next = guard.clone();

        let record = Self::find_mut(&mut next, &self.collection, id)?;
        record.rewrite_id(new_id);
        let updated = record.clone();

        self.persist(&next)?;
        debug!(collection = %self.collection, old_id = %id, new_id = %updated.id, "rewrote record id");
        *guard = next;
        Ok(updated)
    }

    /// Records a failed push attempt against the record.
    pub fn record_sync_attempt(&self, id: &Identifier) -> StoreResult<()> {
        let mut guard = self.records.write().expect("record lock poisoned");
        let mut next = guard.clone();

        let record = Self::find_mut(&mut next, &self.collection, id)?;
        record.record_sync_attempt();

        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn find_mut<'a>(
        records: &'a mut [Record<T>],
        collection: &CollectionName,
        id: &Identifier,
    ) -> StoreResult<&'a mut Record<T>> {
        match records.iter_mut().find(|r| &r.id == id) {
            Some(record) => Ok(record),
            None => {
                error!(collection = %collection, id = %id, "record not found");
                Err(StoreError::not_found("record", collection.as_str(), id.as_str()))
            }
        }
    }

    fn persist(&self, records: &[Record<T>]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(records)?;
        self.medium.write(self.collection.as_str(), &bytes)?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::MemoryMedium;
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;
    use stockline_core::clock::ManualClock;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Material {
        name: String,
        stock: u64,
    }

    fn material(name: &str, stock: u64) -> Material {
        Material {
            name: name.to_string(),
            stock,
        }
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open_store(
        medium: Arc<dyn StorageMedium>,
        clock: Arc<ManualClock>,
    ) -> RecordStore<Material> {
        RecordStore::open(CollectionName::from("materials"), medium, clock).unwrap()
    }

    #[test]
    fn add_mints_local_unsynced_record() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());

        let record = store.add(material("Oak", 12)).unwrap();

        assert!(record.id.is_local());
        assert!(record.is_local);
        assert!(!record.is_synced);
        assert_eq!(store.get().len(), 1);
    }

    #[test]
    fn update_restamps_and_clears_synced() {
        let clock = manual_clock();
        let store = open_store(Arc::new(MemoryMedium::new()), clock.clone());
        let record = store.add(material("Oak", 12)).unwrap();
        store.mark_synced(&record.id, None).unwrap();

        clock.advance(chrono::Duration::minutes(5));
        let updated = store.update(&record.id, material("Oak", 9)).unwrap();

        assert_eq!(updated.payload.stock, 9);
        assert!(!updated.is_synced);
        assert!(updated.updated_at > record.updated_at);
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());

        let err = store
            .update(&Identifier::remote("ghost"), material("x", 0))
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_removes_record() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());
        let record = store.add(material("Oak", 12)).unwrap();

        store.delete(&record.id).unwrap();

        assert!(store.get().is_empty());
        assert!(matches!(
            store.delete(&record.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn mark_synced_reconciles_id() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());
        let record = store.add(material("Oak", 12)).unwrap();

        let synced = store
            .mark_synced(&record.id, Some(Identifier::remote("mat-7")))
            .unwrap();

        assert_eq!(synced.id, Identifier::remote("mat-7"));
        assert!(!synced.is_local);
        assert!(synced.is_synced);
        assert!(store.find(&record.id).is_none());
        assert!(store.find(&Identifier::remote("mat-7")).is_some());
    }

    #[test]
    fn rewrite_id_keeps_record_unsynced() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());
        let record = store.add(material("Oak", 12)).unwrap();

        let rewritten = store
            .rewrite_id(&record.id, Identifier::remote("mat-8"))
            .unwrap();

        assert_eq!(rewritten.id, Identifier::remote("mat-8"));
        assert!(!rewritten.is_local);
        assert!(!rewritten.is_synced);
    }

    #[test]
    fn failed_write_leaves_collection_unchanged() {
        // capacity fits the first record's blob but not the second's
        let medium = Arc::new(MemoryMedium::with_capacity(300));
        let store = open_store(medium, manual_clock());

        store.add(material("Oak", 12)).unwrap();
        let err = store
            .add(material(&"Very Long Material Name ".repeat(10), 1))
            .unwrap_err();

        assert!(matches!(err, StoreError::StorageFull));
        assert_eq!(store.get().len(), 1);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
        let clock = manual_clock();

        let store = open_store(medium.clone(), clock.clone());
        let record = store.add(material("Oak", 12)).unwrap();
        drop(store);

        let reopened = open_store(medium, clock);
        let records = reopened.get();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
        assert_eq!(records[0].payload, material("Oak", 12));
    }

    #[test]
    fn hydrate_builds_synced_records_from_documents() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());
        store.add(material("stale", 1)).unwrap();

        let documents = vec![
            serde_json::json!({ "id": "mat-1", "name": "Oak", "stock": 4 }),
            serde_json::json!({ "id": "mat-2", "name": "Pine", "stock": 9 }),
        ];

        let count = store.hydrate(documents).unwrap();
        assert_eq!(count, 2);

        let records = store.get();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_synced && !r.is_local));
        assert_eq!(records[0].id, Identifier::remote("mat-1"));
    }

    #[test]
    fn hydrate_rejects_document_without_id() {
        let store = open_store(Arc::new(MemoryMedium::new()), manual_clock());

        let err = store
            .hydrate(vec![serde_json::json!({ "name": "Oak", "stock": 4 })])
            .unwrap_err();

        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
