//! # stockline-core: Pure Domain Logic
//!
//! This crate is the heart of the offline-first inventory layer. It contains
//! the domain types and the business logic as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      stockline workspace                            │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                 ★ stockline-core (THIS CRATE) ★               │  │
//! │  │                                                               │  │
//! │  │  ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌──────────────────┐  │  │
//! │  │  │  types  │ │  money  │ │ deduction │ │ record / id      │  │  │
//! │  │  │ Product │ │  Money  │ │ FIFO plan │ │ sync metadata,   │  │  │
//! │  │  │ Batch   │ │ TaxRate │ │ + commit  │ │ local id minting │  │  │
//! │  │  └─────────┘ └─────────┘ └───────────┘ └──────────────────┘  │  │
//! │  │                                                               │  │
//! │  │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │  stockline-store (RecordStore, SyncQueue over blob medium)    │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │  stockline-sync (drain loop, remote authority, reconcile)     │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Variation, Batch, SyncQueueItem)
//! - [`record`] - The `Record<T>` envelope carrying sync metadata
//! - [`id`] - Identifiers, including locally-minted temporary ids
//! - [`money`] - Integer money (no floating point!)
//! - [`deduction`] - The transactional stock deduction engine
//! - [`clock`] - Injected time source for deterministic tests
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: same input, same output - the deduction engine is
//!    a function over a record and line items, nothing more
//! 2. **No I/O**: persistence and network live in the crates above
//! 3. **Integer money**: all monetary values are cents (i64)
//! 4. **Explicit errors**: typed enums, never strings or panics

pub mod clock;
pub mod deduction;
pub mod error;
pub mod id;
pub mod money;
pub mod record;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deduction::{deduct, receive_batch, DeductionLine};
pub use error::{CoreError, CoreResult, DeductionError, ValidationError};
pub use id::{Identifier, LOCAL_ID_PREFIX};
pub use money::{Money, TaxRate};
pub use record::Record;
pub use types::*;
