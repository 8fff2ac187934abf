//! # stockline-sync: Sync Engine and Remote Authority Client
//!
//! The asynchronous edge of the offline-first core. Everything that
//! suspends lives here: the HTTP authority client, the queue drain loop
//! with retry/backoff, and identifier reconciliation.
//!
//! ## Data Flow
//! ```text
//! caller ("record a sale")
//!   │
//!   ▼
//! InventoryService ── deduction engine ──► RecordStore (optimistic write)
//!   │                                            │
//!   └──────────► SyncQueue (durable append) ◄────┘
//!                     │
//!        trigger: reconnect / timer / caller request
//!                     │
//!                     ▼
//!                SyncEngine drain ──► RemoteAuthority (HTTP/JSON, bearer)
//!                     │
//!            ack: mark synced, reconcile ids, notify on_reconciled hooks
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - the drain loop, trigger coalescing, backoff, cancellation
//! - [`authority`] - `RemoteAuthority` trait + reqwest implementation
//! - [`service`] - `InventoryService`, the caller-facing owned struct
//! - [`reconcile`] - `on_reconciled` hooks and the reconciliation log
//! - [`config`] - TOML-backed engine configuration
//! - [`error`] - the retryable/terminal error taxonomy

pub mod authority;
pub mod config;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod service;

pub use authority::{HttpAuthority, NoAuth, RemoteAuthority, StaticToken, TokenProvider};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncHandle, SyncStatus, SyncTarget};
pub use error::{SyncError, SyncResult};
pub use reconcile::ReconcileHub;
pub use service::InventoryService;
