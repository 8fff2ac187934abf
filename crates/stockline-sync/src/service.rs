//! # Inventory Service
//!
//! The caller-facing entry point for the product collection: an explicit
//! owned struct composing the record store, the sync queue, the authority
//! client, and the engine handle. Constructed once at startup and passed by
//! reference - no global state, fully testable with injected fakes.
//!
//! ## Write Path
//! ```text
//! caller ──► validate ──► compute new record state
//!                         (deduction engine for stock operations)
//!                              │
//!                              ▼
//!                    RecordStore write (optimistic)
//!                              │
//!                              ▼
//!                    SyncQueue append (durable)
//!                              │
//!                              ▼
//!                    drain request to the engine
//! ```
//! The caller's write has succeeded once the store and queue commits land;
//! push failures never propagate back here - they are recorded on the queue
//! item and surfaced through [`SyncHandle::status`].

use std::sync::Arc;
use tracing::{debug, info, warn};

use stockline_core::deduction::{self, DeductionLine};
use stockline_core::id::Identifier;
use stockline_core::record::Record;
use stockline_core::types::{Batch, Product, SyncAction};
use stockline_core::validation;
use stockline_store::{RecordStore, StoreError, SyncQueue};

use crate::authority::RemoteAuthority;
use crate::engine::{SyncHandle, SyncStatus};
use crate::error::SyncResult;

/// Service facade over the product collection.
pub struct InventoryService {
    products: Arc<RecordStore<Product>>,
    queue: Arc<SyncQueue>,
    authority: Arc<dyn RemoteAuthority>,
    sync: SyncHandle,
}

impl InventoryService {
    pub fn new(
        products: Arc<RecordStore<Product>>,
        queue: Arc<SyncQueue>,
        authority: Arc<dyn RemoteAuthority>,
        sync: SyncHandle,
    ) -> Self {
        InventoryService {
            products,
            queue,
            authority,
            sync,
        }
    }

    /// Replaces the local snapshot with the authority's state (initial
    /// load). Hydrated records are born synced.
    pub async fn hydrate(&self) -> SyncResult<usize> {
        let collection = self.products.collection().clone();
        let documents = self.authority.list(&collection).await?;
        let count = self.products.hydrate(documents)?;
        info!(collection = %collection, count, "hydrated from authority");
        Ok(count)
    }

    /// Full local snapshot. Never blocks on network.
    pub fn list_products(&self) -> Vec<Record<Product>> {
        self.products.get()
    }

    /// One record by id.
    pub fn product(&self, id: &Identifier) -> Option<Record<Product>> {
        self.products.find(id)
    }

    /// Creates a product optimistically and queues the remote create.
    pub async fn create_product(&self, product: Product) -> SyncResult<Record<Product>> {
        validation::validate_product(&product)?;

        let record = self.products.add(product)?;
        self.enqueue(SyncAction::Create, &record).await?;
        Ok(record)
    }

    /// Updates a product's domain payload and queues the remote update.
    pub async fn update_product(
        &self,
        id: &Identifier,
        patch: Product,
    ) -> SyncResult<Record<Product>> {
        validation::validate_product(&patch)?;

        let record = self.products.update(id, patch)?;
        self.enqueue(SyncAction::Update, &record).await?;
        Ok(record)
    }

    /// Deletes a product locally.
    ///
    /// A record the authority has seen is tombstoned through a queued
    /// Delete. A record that never left this device just cancels its own
    /// pending items - the authority has no id to delete.
    pub async fn delete_product(&self, id: &Identifier) -> SyncResult<()> {
        let collection = self.products.collection().clone();
        let record = self.products.find(id).ok_or_else(|| StoreError::NotFound {
            entity: "record",
            collection: collection.as_str().to_string(),
            id: id.as_str().to_string(),
        })?;

        self.products.delete(id)?;

        if record.is_local {
            let cancelled = self.queue.cancel_pending(&collection, id)?;
            debug!(id = %id, cancelled, "deleted never-synced record, pending items cancelled");
        } else {
            self.queue.enqueue(
                collection.clone(),
                SyncAction::Delete,
                id.clone(),
                serde_json::Value::Null,
            )?;
            self.notify_sync().await;
        }
        Ok(())
    }

    /// Deducts stock across the product's pools, all lines or nothing, and
    /// queues the remote update.
    ///
    /// `InsufficientStock` comes back synchronously and the stored record is
    /// byte-for-byte unchanged - a business rejection, not a sync fault.
    pub async fn deduct_stock(
        &self,
        id: &Identifier,
        lines: &[DeductionLine],
    ) -> SyncResult<Record<Product>> {
        validation::validate_lines(lines)?;

        let record = self.products.find(id).ok_or_else(|| StoreError::NotFound {
            entity: "record",
            collection: self.products.collection().as_str().to_string(),
            id: id.as_str().to_string(),
        })?;

        let deducted = deduction::deduct(&record.payload, lines)?;

        let record = self.products.update(id, deducted)?;
        self.enqueue(SyncAction::Update, &record).await?;
        Ok(record)
    }

    /// Appends a received batch (restock) and queues the remote update.
    pub async fn receive_batch(
        &self,
        id: &Identifier,
        batch: Batch,
    ) -> SyncResult<Record<Product>> {
        validation::validate_batch(&batch)?;

        let record = self.products.find(id).ok_or_else(|| StoreError::NotFound {
            entity: "record",
            collection: self.products.collection().as_str().to_string(),
            id: id.as_str().to_string(),
        })?;

        let restocked = deduction::receive_batch(&record.payload, batch);

        let record = self.products.update(id, restocked)?;
        self.enqueue(SyncAction::Update, &record).await?;
        Ok(record)
    }

    /// Pending/abandoned counts for UI surfacing.
    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Subscribes to identifier reconciliation events.
    pub fn on_reconciled(&self, hook: impl Fn(&Identifier, &Identifier) + Send + Sync + 'static) {
        self.sync.on_reconciled(hook);
    }

    async fn enqueue(&self, action: SyncAction, record: &Record<Product>) -> SyncResult<()> {
        let payload = serde_json::to_value(&record.payload)?;
        self.queue.enqueue(
            self.products.collection().clone(),
            action,
            record.id.clone(),
            payload,
        )?;
        self.notify_sync().await;
        Ok(())
    }

    /// Nudges the engine. The optimistic write already succeeded, so a dead
    /// engine is logged, not surfaced.
    async fn notify_sync(&self) {
        let collection = self.products.collection().clone();
        if let Err(e) = self.sync.request_drain(collection).await {
            warn!(error = %e, "drain request not delivered");
        }
    }
}
