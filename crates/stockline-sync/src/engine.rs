//! # Sync Engine
//!
//! Drains the durable sync queue against the remote authority.
//!
//! ## Drain Flow
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine::run                                │
//! │                                                                        │
//! │   triggers:  periodic timer │ connectivity restored │ caller request   │
//! │                      │              │                      │           │
//! │                      └──────────────┴──────────────────────┘           │
//! │                                     │                                  │
//! │                                     ▼                                  │
//! │              one drain task per collection with pending items          │
//! │              (an active pass suppresses re-entrant triggers)           │
//! │                                     │                                  │
//! │   per item, oldest first:           ▼                                  │
//! │                                                                        │
//! │   Pending ──► InFlight ──(ack 2xx)──────────► Synced       [terminal]  │
//! │                  │──(401 / other 4xx)───────► Abandoned    [terminal]  │
//! │                  │──(network / 5xx / t-out)─► Pending, attempts += 1   │
//! │                                               backoff, re-dequeue      │
//! │   Pending ──(attempts >= max)───────────────► Abandoned    [terminal]  │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ordering: items within a collection drain strictly in `created_at` order
//! (a Create must reach the authority before the Updates that follow it), so
//! a retryable failure stops the pass and re-dequeues after backoff instead
//! of skipping ahead. Collections drain independently of each other.
//!
//! Cancellation: shutdown is a watch flag checked between items and during
//! backoff sleeps. An item that already failed is rolled back to `Pending`
//! before the task returns; the queue never loses an item.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::backoff::Backoff;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use stockline_core::id::Identifier;
use stockline_core::types::{CollectionName, SyncAction, SyncQueueItem, SyncState};
use stockline_store::{RecordStore, StoreError, SyncQueue};

use crate::authority::RemoteAuthority;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::ReconcileHub;

// =============================================================================
// Sync Target
// =============================================================================

/// The engine's type-erased view of one collection's record store: just the
/// operations a drain needs, independent of the record type.
pub trait SyncTarget: Send + Sync {
    fn collection(&self) -> &CollectionName;

    /// Marks a record fully synced, rewriting its id if given.
    fn mark_synced(&self, id: &Identifier, new_id: Option<Identifier>) -> Result<(), StoreError>;

    /// Rewrites a record's id without claiming it is synced.
    fn rewrite_id(&self, id: &Identifier, new_id: Identifier) -> Result<(), StoreError>;

    /// Bumps the record's failed-push counter.
    fn record_sync_attempt(&self, id: &Identifier) -> Result<(), StoreError>;
}

impl<T> SyncTarget for RecordStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn collection(&self) -> &CollectionName {
        RecordStore::collection(self)
    }

    fn mark_synced(&self, id: &Identifier, new_id: Option<Identifier>) -> Result<(), StoreError> {
        RecordStore::mark_synced(self, id, new_id).map(|_| ())
    }

    fn rewrite_id(&self, id: &Identifier, new_id: Identifier) -> Result<(), StoreError> {
        RecordStore::rewrite_id(self, id, new_id).map(|_| ())
    }

    fn record_sync_attempt(&self, id: &Identifier) -> Result<(), StoreError> {
        RecordStore::record_sync_attempt(self, id)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Queue counts surfaced to the UI ("3 changes waiting to sync").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Items waiting to drain.
    pub pending: usize,
    /// Items given up on, needing user attention.
    pub abandoned: usize,
}

// =============================================================================
// Engine
// =============================================================================

struct EngineShared {
    queue: Arc<SyncQueue>,
    authority: Arc<dyn RemoteAuthority>,
    config: SyncConfig,
    hub: Arc<ReconcileHub>,
    targets: Mutex<HashMap<CollectionName, Arc<dyn SyncTarget>>>,
    /// Collections with a drain pass in progress. The flag marks a trigger
    /// that arrived mid-pass: the running task re-checks the queue once
    /// more instead of a second concurrent pass being spawned.
    active: Mutex<HashMap<CollectionName, bool>>,
}

/// The drain loop. Construct with [`SyncEngine::new`], register the record
/// stores it drains for, then spawn [`SyncEngine::run`] as a background
/// task and keep the [`SyncHandle`].
pub struct SyncEngine {
    shared: Arc<EngineShared>,
    drain_rx: mpsc::Receiver<CollectionName>,
    online_rx: watch::Receiver<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Cloneable control handle for a running [`SyncEngine`].
#[derive(Clone)]
pub struct SyncHandle {
    drain_tx: mpsc::Sender<CollectionName>,
    online_tx: Arc<watch::Sender<bool>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shared: Arc<EngineShared>,
}

impl SyncEngine {
    /// Creates an engine and its handle. The engine starts assuming it is
    /// online; connectivity changes arrive through the handle.
    pub fn new(
        queue: Arc<SyncQueue>,
        authority: Arc<dyn RemoteAuthority>,
        config: SyncConfig,
    ) -> (Self, SyncHandle) {
        let (drain_tx, drain_rx) = mpsc::channel(64);
        let (online_tx, online_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(EngineShared {
            queue,
            authority,
            config,
            hub: Arc::new(ReconcileHub::new()),
            targets: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        });

        let engine = SyncEngine {
            shared: shared.clone(),
            drain_rx,
            online_rx,
            shutdown_rx,
        };
        let handle = SyncHandle {
            drain_tx,
            online_tx: Arc::new(online_tx),
            shutdown_tx: Arc::new(shutdown_tx),
            shared,
        };

        (engine, handle)
    }

    /// Registers the record store the engine drains for a collection.
    pub fn register(&self, target: Arc<dyn SyncTarget>) {
        let collection = target.collection().clone();
        debug!(collection = %collection, "registered sync target");
        let mut targets = self.shared.targets.lock().expect("targets mutex poisoned");
        targets.insert(collection, target);
    }

    /// Runs the trigger loop until shutdown. Spawn as a background task.
    pub async fn run(mut self) {
        info!("sync engine starting");

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.shared.config.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *self.online_rx.borrow() {
                        self.drain_all();
                    }
                }

                changed = self.online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *self.online_rx.borrow() {
                        info!("connectivity restored, draining all collections");
                        self.drain_all();
                    } else {
                        debug!("connectivity lost");
                    }
                }

                request = self.drain_rx.recv() => {
                    match request {
                        Some(collection) => {
                            if *self.online_rx.borrow() {
                                self.spawn_drain(collection);
                            } else {
                                debug!(collection = %collection, "offline, drain request deferred");
                            }
                        }
                        None => break,
                    }
                }

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("sync engine shutting down");
                        break;
                    }
                }
            }
        }

        info!("sync engine stopped");
    }

    fn drain_all(&self) {
        for collection in self.shared.queue.pending_collections() {
            self.spawn_drain(collection);
        }
    }

    fn spawn_drain(&self, collection: CollectionName) {
        {
            let mut active = self.shared.active.lock().expect("active mutex poisoned");
            if let Some(rerun) = active.get_mut(&collection) {
                // a pass is running; it will take one more look at the
                // queue before finishing
                *rerun = true;
                debug!(collection = %collection, "drain already in progress, trigger coalesced");
                return;
            }
            active.insert(collection.clone(), false);
        }

        let shared = self.shared.clone();
        let shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                drain_collection(&shared, &collection, shutdown.clone()).await;

                let mut active = shared.active.lock().expect("active mutex poisoned");
                if active.get(&collection) == Some(&true) {
                    // a trigger landed mid-pass; run again
                    active.insert(collection.clone(), false);
                } else {
                    active.remove(&collection);
                    break;
                }
            }
        });
    }
}

impl SyncHandle {
    /// Requests a drain of one collection (called after an optimistic
    /// write). Coalesced away if a pass is already running.
    pub async fn request_drain(&self, collection: CollectionName) -> SyncResult<()> {
        self.drain_tx
            .send(collection)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Signals a connectivity change. Going online drains everything
    /// pending.
    pub fn set_online(&self, online: bool) {
        let _ = self.online_tx.send(online);
    }

    /// Current connectivity assumption.
    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Stops the engine. In-flight items are rolled back to pending; the
    /// queue stays consistent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Queue counts for UI surfacing.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            pending: self.shared.queue.pending_count(),
            abandoned: self.shared.queue.abandoned_count(),
        }
    }

    /// Subscribes to identifier reconciliation events:
    /// `on_reconciled(old_id, new_id)`.
    pub fn on_reconciled(&self, hook: impl Fn(&Identifier, &Identifier) + Send + Sync + 'static) {
        self.shared.hub.subscribe(hook);
    }
}

// =============================================================================
// Drain Pass
// =============================================================================

async fn drain_collection(
    shared: &EngineShared,
    collection: &CollectionName,
    mut shutdown: watch::Receiver<bool>,
) {
    let target = {
        let targets = shared.targets.lock().expect("targets mutex poisoned");
        targets.get(collection).cloned()
    };
    let Some(target) = target else {
        warn!(collection = %collection, "no sync target registered, skipping drain");
        return;
    };

    let mut policy = shared.config.backoff_policy();

    'pass: loop {
        if *shutdown.borrow() {
            return;
        }

        let items = shared.queue.dequeue_pending(collection);
        if items.is_empty() {
            break;
        }
        debug!(collection = %collection, count = items.len(), "draining sync queue");

        for item in items {
            if *shutdown.borrow() {
                debug!(collection = %collection, "drain cancelled by shutdown");
                return;
            }

            if let Err(e) = shared.queue.mark(&item.id, SyncState::InFlight) {
                error!(item = %item.id, error = %e, "failed to mark item in flight, aborting pass");
                return;
            }

            match push_item(shared, &target, &item).await {
                Ok(()) => {
                    if let Err(e) = shared.queue.mark(&item.id, SyncState::Synced) {
                        error!(item = %item.id, error = %e, "failed to mark item synced, aborting pass");
                        return;
                    }
                    policy.reset();
                }

                Err(e) if !e.is_retryable() => {
                    warn!(
                        item = %item.id,
                        action = %item.action,
                        target = %item.target_id,
                        error = %e,
                        "abandoning queue item"
                    );
                    if let Err(me) = shared.queue.mark(&item.id, SyncState::Abandoned) {
                        error!(item = %item.id, error = %me, "failed to abandon item, aborting pass");
                        return;
                    }
                }

                Err(e) => {
                    let attempts = match shared.queue.record_failure(&item.id, &e.to_string()) {
                        Ok(attempts) => attempts,
                        Err(me) => {
                            error!(item = %item.id, error = %me, "failed to record push failure, aborting pass");
                            return;
                        }
                    };
                    if let Err(se) = target.record_sync_attempt(&item.target_id) {
                        // deletes have no local record left to stamp
                        debug!(target = %item.target_id, error = %se, "no record to stamp sync attempt on");
                    }

                    if attempts >= shared.config.max_attempts {
                        warn!(
                            item = %item.id,
                            attempts,
                            error = %e,
                            "max sync attempts reached, abandoning"
                        );
                        if let Err(me) = shared.queue.mark(&item.id, SyncState::Abandoned) {
                            error!(item = %item.id, error = %me, "failed to abandon item, aborting pass");
                            return;
                        }
                        continue;
                    }

                    let delay = policy
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(shared.config.backoff_max_ms));
                    warn!(
                        item = %item.id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "push failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            debug!(collection = %collection, "backoff interrupted by shutdown");
                            return;
                        }
                    }
                    // re-dequeue from the top: the failed item must still
                    // drain before anything enqueued after it
                    continue 'pass;
                }
            }
        }

        // a pass may have run while new writes were enqueued; loop once
        // more so the dequeue decides whether anything is left
    }
}

/// Pushes one queue item to the authority and applies the local outcome.
async fn push_item(
    shared: &EngineShared,
    target: &Arc<dyn SyncTarget>,
    item: &SyncQueueItem,
) -> SyncResult<()> {
    match item.action {
        SyncAction::Create => {
            // Idempotency: a Create whose target already carries a server id
            // was accepted in an earlier pass - reconciliation rewrote the
            // target before this item could be marked synced (crash window),
            // so re-sending would duplicate the record remotely.
            if !item.target_id.is_local() {
                debug!(item = %item.id, target = %item.target_id, "create target already reconciled, dropping");
                return Ok(());
            }
            // Same race, observed through the in-process reconcile log.
            if let Some(new_id) = shared.hub.resolve(&item.target_id) {
                debug!(item = %item.id, old = %item.target_id, new = %new_id, "create reconciled concurrently, dropping");
                return Ok(());
            }

            let new_id = shared
                .authority
                .create(&item.collection, &item.payload)
                .await?;
            info!(
                collection = %item.collection,
                old = %item.target_id,
                new = %new_id,
                "record accepted by authority"
            );
            reconcile(shared, target, item, new_id)
        }

        SyncAction::Update => {
            shared
                .authority
                .update(&item.collection, &item.target_id, &item.payload)
                .await?;
            finish_target(shared, target, item)
        }

        SyncAction::Delete => {
            shared
                .authority
                .delete(&item.collection, &item.target_id)
                .await?;
            Ok(())
        }
    }
}

/// Identifier reconciliation, one step: queue targets, then the store
/// record, then external subscribers.
///
/// The queue is rewritten first: once the pending items target the server
/// id, a replay of this Create after a crash is recognized as already
/// reconciled and dropped instead of re-sent.
fn reconcile(
    shared: &EngineShared,
    target: &Arc<dyn SyncTarget>,
    item: &SyncQueueItem,
    new_id: Identifier,
) -> SyncResult<()> {
    let old_id = &item.target_id;

    match shared.queue.rewrite_target(old_id, &new_id) {
        Ok(count) => debug!(old = %old_id, new = %new_id, count, "queue targets rewritten"),
        Err(e) => {
            // Pending Updates/Deletes would keep targeting a dead local id.
            // Unrecoverable without manual intervention.
            error!(
                old = %old_id,
                new = %new_id,
                error = %e,
                "queue target rewrite failed; pending items may reference a dead local id"
            );
            return Err(SyncError::Internal(format!(
                "identifier reconciliation failed: {e}"
            )));
        }
    }

    let fully_synced = !has_other_queued(shared, item, &new_id);
    let store_result = if fully_synced {
        target.mark_synced(old_id, Some(new_id.clone()))
    } else {
        // newer local state is still queued; rewrite the id but leave the
        // record marked unsynced
        target.rewrite_id(old_id, new_id.clone())
    };
    match store_result {
        Ok(()) => {}
        Err(StoreError::NotFound { .. }) => {
            // deleted locally between enqueue and ack; the queued Delete now
            // targets the server id and will finish the job
            debug!(old = %old_id, "record deleted locally before create ack");
        }
        Err(e) => {
            error!(old = %old_id, new = %new_id, error = %e, "store id rewrite failed");
            return Err(SyncError::Internal(format!(
                "identifier reconciliation failed: {e}"
            )));
        }
    }

    shared.hub.record(old_id.clone(), new_id);
    Ok(())
}

/// Marks the record synced if this item was the last queued mutation for it.
fn finish_target(
    shared: &EngineShared,
    target: &Arc<dyn SyncTarget>,
    item: &SyncQueueItem,
) -> SyncResult<()> {
    if has_other_queued(shared, item, &item.target_id) {
        // a newer mutation is still queued; the record stays unsynced
        return Ok(());
    }
    match target.mark_synced(&item.target_id, None) {
        Ok(()) => Ok(()),
        Err(StoreError::NotFound { .. }) => {
            debug!(target = %item.target_id, "record deleted locally before ack");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// True if any other non-terminal queue item targets the record.
fn has_other_queued(shared: &EngineShared, item: &SyncQueueItem, target_id: &Identifier) -> bool {
    shared
        .queue
        .items()
        .iter()
        .any(|other| other.id != item.id && &other.target_id == target_id && !other.state.is_terminal())
}
