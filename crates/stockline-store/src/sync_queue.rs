//! # Sync Queue
//!
//! The durable, append-only ledger of pending mutations. Queue content is
//! independent of RecordStore content: a record may be deleted locally while
//! its queue history is still draining.
//!
//! ## The Ledger
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  "sync_queue" blob                                                     │
//! │                                                                        │
//! │  id     collection  action  target_id    attempts  state               │
//! │  ────┼───────────┼────────┼────────────┼─────────┼──────────           │
//! │  q1  │ products  │ create │ local-a1…  │ 0       │ pending             │
//! │  q2  │ products  │ update │ local-a1…  │ 0       │ pending             │
//! │  q3  │ materials │ delete │ mat-17     │ 2       │ pending             │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drain order within a collection is `created_at` ascending - the causal
//! history of a single record (Create before Update before Delete) replays
//! against the authority in the order it happened.
//!
//! ## Durability
//! Every mutation persists the ledger blob before the in-memory copy
//! commits, same discipline as the record store. A rejected write leaves
//! the queue exactly as it was.
//!
//! ## Crash Recovery
//! `InFlight` is only ever a transient state. Finding one at open time means
//! the process died mid-drain; the item is rolled back to `Pending` so the
//! next drain replays it.

use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use stockline_core::clock::Clock;
use stockline_core::id::Identifier;
use stockline_core::types::{CollectionName, SyncAction, SyncQueueItem, SyncState};

use crate::error::{StoreError, StoreResult};
use crate::medium::StorageMedium;

/// Persisted blob key for the queue.
pub const SYNC_QUEUE_KEY: &str = "sync_queue";

/// Durable ordered ledger of pending mutations.
pub struct SyncQueue {
    medium: Arc<dyn StorageMedium>,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl SyncQueue {
    /// Opens the queue, loading any persisted ledger and rolling crashed
    /// `InFlight` items back to `Pending`.
    pub fn open(medium: Arc<dyn StorageMedium>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let mut items: Vec<SyncQueueItem> = match medium.read(SYNC_QUEUE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };

        let mut rolled_back = 0usize;
        for item in items.iter_mut() {
            if item.state == SyncState::InFlight {
                item.state = SyncState::Pending;
                rolled_back += 1;
            }
        }

        let queue = SyncQueue {
            medium,
            clock,
            items: Mutex::new(items),
        };

        if rolled_back > 0 {
            warn!(count = rolled_back, "rolled back in-flight items from a previous run");
            let items = queue.items.lock().expect("queue mutex poisoned");
            queue.persist(&items)?;
        }

        Ok(queue)
    }

    /// Appends a pending mutation to the ledger.
    pub fn enqueue(
        &self,
        collection: CollectionName,
        action: SyncAction,
        target_id: Identifier,
        payload: serde_json::Value,
    ) -> StoreResult<SyncQueueItem> {
        let item = SyncQueueItem {
            id: Uuid::new_v4().to_string(),
            collection,
            action,
            target_id,
            payload,
            attempts: 0,
            last_error: None,
            created_at: self.clock.now(),
            state: SyncState::Pending,
        };

        let mut items = self.items.lock().expect("queue mutex poisoned");
        let mut next = items.clone();
        next.push(item.clone());
        self.persist(&next)?;
        *items = next;

        debug!(
            item = %item.id,
            collection = %item.collection,
            action = %item.action,
            target = %item.target_id,
            "enqueued mutation"
        );
        Ok(item)
    }

    /// Returns the pending items for `collection`, oldest first.
    pub fn dequeue_pending(&self, collection: &CollectionName) -> Vec<SyncQueueItem> {
        let items = self.items.lock().expect("queue mutex poisoned");
        let mut pending: Vec<SyncQueueItem> = items
            .iter()
            .filter(|i| &i.collection == collection && i.state == SyncState::Pending)
            .cloned()
            .collect();
        // stable: equal timestamps keep enqueue order
        pending.sort_by_key(|i| i.created_at);
        pending
    }

    /// Collections that currently have pending items.
    pub fn pending_collections(&self) -> Vec<CollectionName> {
        let items = self.items.lock().expect("queue mutex poisoned");
        let mut collections: Vec<CollectionName> = Vec::new();
        for item in items.iter() {
            if item.state == SyncState::Pending && !collections.contains(&item.collection) {
                collections.push(item.collection.clone());
            }
        }
        collections
    }

    /// Moves an item to `state`, enforcing the forward-only state machine.
    ///
    /// An illegal transition is refused, logged loudly, and surfaced as
    /// `InvalidTransition` - it indicates an engine bug, never a user error.
    pub fn mark(&self, item_id: &str, state: SyncState) -> StoreResult<()> {
        let mut items = self.items.lock().expect("queue mutex poisoned");

        let index = Self::find_index(&items, item_id)?;
        let current = items[index].state;
        if !current.can_transition_to(state) {
            error!(item = %item_id, from = %current, to = %state, "illegal queue transition");
            return Err(StoreError::InvalidTransition {
                from: current,
                to: state,
            });
        }

        let mut next = items.clone();
        next[index].state = state;
        self.persist(&next)?;
        *items = next;

        debug!(item = %item_id, from = %current, to = %state, "queue item transition");
        Ok(())
    }

    /// Records a failed push: attempts incremented, error kept for the UI,
    /// item rolled back from `InFlight` to `Pending`. Returns the new
    /// attempt count.
    pub fn record_failure(&self, item_id: &str, error: &str) -> StoreResult<u32> {
        let mut items = self.items.lock().expect("queue mutex poisoned");

        let index = Self::find_index(&items, item_id)?;
        let current = items[index].state;
        if !current.can_transition_to(SyncState::Pending) {
            error!(item = %item_id, from = %current, "illegal retry rollback");
            return Err(StoreError::InvalidTransition {
                from: current,
                to: SyncState::Pending,
            });
        }

        let mut next = items.clone();
        next[index].attempts = next[index].attempts.saturating_add(1);
        next[index].last_error = Some(error.to_string());
        next[index].state = SyncState::Pending;
        let attempts = next[index].attempts;

        self.persist(&next)?;
        *items = next;
        Ok(attempts)
    }

    /// Rewrites `target_id` on every non-terminal item referencing `old_id`
    /// (identifier reconciliation, queue side). Returns how many were
    /// rewritten.
    pub fn rewrite_target(&self, old_id: &Identifier, new_id: &Identifier) -> StoreResult<usize> {
        let mut items = self.items.lock().expect("queue mutex poisoned");

        let mut next = items.clone();
        let mut rewritten = 0usize;
        for item in next.iter_mut() {
            if !item.state.is_terminal() && &item.target_id == old_id {
                item.target_id = new_id.clone();
                rewritten += 1;
            }
        }

        if rewritten > 0 {
            self.persist(&next)?;
            *items = next;
            debug!(old = %old_id, new = %new_id, count = rewritten, "rewrote queue targets");
        }
        Ok(rewritten)
    }

    /// Removes still-pending items for a record that was deleted before it
    /// ever reached the authority. Removal, not a backward transition.
    pub fn cancel_pending(
        &self,
        collection: &CollectionName,
        target_id: &Identifier,
    ) -> StoreResult<usize> {
        let mut items = self.items.lock().expect("queue mutex poisoned");

        let mut next = items.clone();
        let before = next.len();
        next.retain(|i| {
            !(&i.collection == collection
                && &i.target_id == target_id
                && i.state == SyncState::Pending)
        });
        let cancelled = before - next.len();

        if cancelled > 0 {
            self.persist(&next)?;
            *items = next;
            debug!(collection = %collection, target = %target_id, count = cancelled, "cancelled pending items");
        }
        Ok(cancelled)
    }

    /// Drops terminal `Synced` items from the ledger.
    pub fn purge_synced(&self) -> StoreResult<usize> {
        let mut items = self.items.lock().expect("queue mutex poisoned");

        let mut next = items.clone();
        let before = next.len();
        next.retain(|i| i.state != SyncState::Synced);
        let purged = before - next.len();

        if purged > 0 {
            self.persist(&next)?;
            *items = next;
            debug!(count = purged, "purged synced items");
        }
        Ok(purged)
    }

    /// Pending items across all collections (UI surfacing).
    pub fn pending_count(&self) -> usize {
        let items = self.items.lock().expect("queue mutex poisoned");
        items.iter().filter(|i| i.state == SyncState::Pending).count()
    }

    /// Abandoned items across all collections (UI surfacing).
    pub fn abandoned_count(&self) -> usize {
        let items = self.items.lock().expect("queue mutex poisoned");
        items
            .iter()
            .filter(|i| i.state == SyncState::Abandoned)
            .count()
    }

    /// Full ledger snapshot.
    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.items.lock().expect("queue mutex poisoned").clone()
    }

    fn find_index(items: &[SyncQueueItem], item_id: &str) -> StoreResult<usize> {
        match items.iter().position(|i| i.id == item_id) {
            Some(index) => Ok(index),
            None => {
                error!(item = %item_id, "queue item not found");
                Err(StoreError::not_found("queue item", SYNC_QUEUE_KEY, item_id))
            }
        }
    }

    fn persist(&self, items: &[SyncQueueItem]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(items)?;
        self.medium.write(SYNC_QUEUE_KEY, &bytes)?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{MediumError, MemoryMedium};
    use chrono::{Duration, TimeZone, Utc};
    use stockline_core::clock::ManualClock;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn open_queue(medium: Arc<dyn StorageMedium>, clock: Arc<ManualClock>) -> SyncQueue {
        SyncQueue::open(medium, clock).unwrap()
    }

    fn products() -> CollectionName {
        CollectionName::from("products")
    }

    #[test]
    fn dequeue_orders_by_created_at_per_collection() {
        let clock = manual_clock();
        let queue = open_queue(Arc::new(MemoryMedium::new()), clock.clone());

        let a = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();
        clock.advance(Duration::seconds(1));
        let other = queue
            .enqueue(
                CollectionName::from("materials"),
                SyncAction::Create,
                Identifier::local(),
                serde_json::json!({}),
            )
            .unwrap();
        clock.advance(Duration::seconds(1));
        let b = queue
            .enqueue(products(), SyncAction::Update, Identifier::local(), serde_json::json!({}))
            .unwrap();

        let pending = queue.dequeue_pending(&products());
        let ids: Vec<&str> = pending.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);

        assert_eq!(queue.dequeue_pending(&other.collection).len(), 1);
    }

    #[test]
    fn equal_timestamps_keep_enqueue_order() {
        // frozen clock: every item lands on the same instant
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());

        let first = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();
        let second = queue
            .enqueue(products(), SyncAction::Update, Identifier::local(), serde_json::json!({}))
            .unwrap();

        let pending = queue.dequeue_pending(&products());
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[test]
    fn mark_walks_the_state_machine_forward() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let item = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();

        queue.mark(&item.id, SyncState::InFlight).unwrap();
        queue.mark(&item.id, SyncState::Synced).unwrap();

        // terminal: nothing may leave Synced
        let err = queue.mark(&item.id, SyncState::Pending).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn pending_cannot_skip_to_synced() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let item = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();

        let err = queue.mark(&item.id, SyncState::Synced).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn record_failure_rolls_back_and_counts() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let item = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();

        queue.mark(&item.id, SyncState::InFlight).unwrap();
        let attempts = queue.record_failure(&item.id, "connection refused").unwrap();

        assert_eq!(attempts, 1);
        let stored = &queue.dequeue_pending(&products())[0];
        assert_eq!(stored.state, SyncState::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn rewrite_target_touches_only_non_terminal_items() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let local = Identifier::local();
        let server = Identifier::remote("prod-9");

        let create = queue
            .enqueue(products(), SyncAction::Create, local.clone(), serde_json::json!({}))
            .unwrap();
        let update = queue
            .enqueue(products(), SyncAction::Update, local.clone(), serde_json::json!({}))
            .unwrap();
        queue.mark(&create.id, SyncState::InFlight).unwrap();
        queue.mark(&create.id, SyncState::Synced).unwrap();

        let rewritten = queue.rewrite_target(&local, &server).unwrap();
        assert_eq!(rewritten, 1);

        let items = queue.items();
        let synced = items.iter().find(|i| i.id == create.id).unwrap();
        let pending = items.iter().find(|i| i.id == update.id).unwrap();
        assert_eq!(synced.target_id, local);
        assert_eq!(pending.target_id, server);
    }

    #[test]
    fn cancel_pending_removes_only_matching_items() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let target = Identifier::local();
        let other = Identifier::local();

        queue
            .enqueue(products(), SyncAction::Create, target.clone(), serde_json::json!({}))
            .unwrap();
        queue
            .enqueue(products(), SyncAction::Update, target.clone(), serde_json::json!({}))
            .unwrap();
        queue
            .enqueue(products(), SyncAction::Create, other.clone(), serde_json::json!({}))
            .unwrap();

        let cancelled = queue.cancel_pending(&products(), &target).unwrap();

        assert_eq!(cancelled, 2);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn purge_drops_synced_only() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        let done = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();
        queue
            .enqueue(products(), SyncAction::Update, Identifier::local(), serde_json::json!({}))
            .unwrap();

        queue.mark(&done.id, SyncState::InFlight).unwrap();
        queue.mark(&done.id, SyncState::Synced).unwrap();

        assert_eq!(queue.purge_synced().unwrap(), 1);
        assert_eq!(queue.items().len(), 1);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn open_rolls_in_flight_back_to_pending() {
        let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
        let clock = manual_clock();

        let queue = open_queue(medium.clone(), clock.clone());
        let item = queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();
        queue.mark(&item.id, SyncState::InFlight).unwrap();
        drop(queue);

        // simulated crash: reopen from the same medium
        let reopened = open_queue(medium, clock);
        let pending = reopened.dequeue_pending(&products());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state, SyncState::Pending);
    }

    #[test]
    fn ledger_survives_reopen() {
        let medium: Arc<dyn StorageMedium> = Arc::new(MemoryMedium::new());
        let clock = manual_clock();

        let queue = open_queue(medium.clone(), clock.clone());
        queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({"name": "Oak"}))
            .unwrap();
        drop(queue);

        let reopened = open_queue(medium, clock);
        assert_eq!(reopened.pending_count(), 1);
        assert_eq!(reopened.items()[0].payload, serde_json::json!({"name": "Oak"}));
    }

    #[test]
    fn pending_collections_deduplicates() {
        let queue = open_queue(Arc::new(MemoryMedium::new()), manual_clock());
        queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();
        queue
            .enqueue(products(), SyncAction::Update, Identifier::local(), serde_json::json!({}))
            .unwrap();
        queue
            .enqueue(
                CollectionName::from("materials"),
                SyncAction::Create,
                Identifier::local(),
                serde_json::json!({}),
            )
            .unwrap();

        let collections = queue.pending_collections();
        assert_eq!(collections.len(), 2);
    }

    #[test]
    fn rejected_write_leaves_ledger_unchanged() {
        struct RejectingMedium(MemoryMedium, std::sync::atomic::AtomicBool);
        impl StorageMedium for RejectingMedium {
            fn read(&self, key: &str) -> Result<Option<Vec<u8>>, MediumError> {
                self.0.read(key)
            }
            fn write(&self, key: &str, bytes: &[u8]) -> Result<(), MediumError> {
                if self.1.load(std::sync::atomic::Ordering::SeqCst) {
                    return Err(MediumError::Full);
                }
                self.0.write(key, bytes)
            }
            fn remove(&self, key: &str) -> Result<(), MediumError> {
                self.0.remove(key)
            }
        }

        let medium = Arc::new(RejectingMedium(
            MemoryMedium::new(),
            std::sync::atomic::AtomicBool::new(false),
        ));
        let queue = SyncQueue::open(medium.clone(), manual_clock()).unwrap();
        queue
            .enqueue(products(), SyncAction::Create, Identifier::local(), serde_json::json!({}))
            .unwrap();

        medium.1.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = queue
            .enqueue(products(), SyncAction::Update, Identifier::local(), serde_json::json!({}))
            .unwrap_err();

        assert!(matches!(err, StoreError::StorageFull));
        assert_eq!(queue.items().len(), 1);
    }
}
