//! # stockline-store: Local Persistence Layer
//!
//! The durable half of the offline-first core: a collection-keyed record
//! store and an append-only ledger of pending mutations, both persisted as
//! atomic blobs through a pluggable [`StorageMedium`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  callers (InventoryService, SyncEngine)                             │
//! └──────────────┬───────────────────────────────┬──────────────────────┘
//!                │                               │
//! ┌──────────────▼──────────────┐ ┌──────────────▼──────────────────────┐
//! │  RecordStore<T>             │ │  SyncQueue                          │
//! │  snapshot per collection    │ │  ordered mutation ledger            │
//! │  persist-then-commit        │ │  forward-only state machine         │
//! └──────────────┬──────────────┘ └──────────────┬──────────────────────┘
//!                │                               │
//! ┌──────────────▼───────────────────────────────▼──────────────────────┐
//! │  StorageMedium (atomic whole-blob read/write, platform-owned)       │
//! │  MemoryMedium (tests, ephemeral) • FileMedium (temp-file + rename)  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability Contract
//! RecordStore and SyncQueue are independently durable. Every mutation is
//! written to the medium *before* the in-memory snapshot commits, so losing
//! the process can never fabricate state - in particular it can never
//! produce a record claiming `is_synced = true` that the remote authority
//! never acknowledged.

pub mod error;
pub mod medium;
pub mod record_store;
pub mod sync_queue;

pub use error::{StoreError, StoreResult};
pub use medium::{FileMedium, MediumError, MemoryMedium, StorageMedium};
pub use record_store::RecordStore;
pub use sync_queue::{SyncQueue, SYNC_QUEUE_KEY};
