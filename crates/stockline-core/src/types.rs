//! # Domain Types
//!
//! Core domain types for the inventory layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  Product                                                               │
//! │  ────────────────                                                      │
//! │  name, sku, price, cost_price, tax                                     │
//! │                                                                        │
//! │  batches: Vec<Batch>          dated stock pools, consumed oldest-      │
//! │                               received first                           │
//! │  variations: Vec<Variation>   named stock pools, declaration order     │
//! └────────────────────────────────────────────────────────────────────────┘
//!
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  SyncQueueItem                                                         │
//! │  ────────────────                                                      │
//! │  one pending mutation (Create/Update/Delete) against one record,       │
//! │  with a forward-only state machine:                                    │
//! │                                                                        │
//! │  Pending ──► InFlight ──► Synced        [terminal]                     │
//! │     │            │──────► Abandoned     [terminal]                     │
//! │     │            └──────► Pending       (retry rollback)               │
//! │     └──────────────────► Abandoned      (max attempts)                 │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::Identifier;
use crate::money::{Money, TaxRate};

// =============================================================================
// Collection Name
// =============================================================================

/// The name of a record collection (e.g. "products", "materials").
///
/// Doubles as the persisted blob key for the collection snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn new(name: impl Into<String>) -> Self {
        CollectionName(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionName {
    fn from(s: &str) -> Self {
        CollectionName(s.to_string())
    }
}

// =============================================================================
// Tax Detail
// =============================================================================

/// Tax configuration attached to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxDetail {
    /// Rate in basis points (825 = 8.25%).
    pub rate: TaxRate,

    /// True when the listed price already includes tax.
    pub inclusive: bool,
}

// =============================================================================
// Stock Pools
// =============================================================================

/// A named stock pool within a product.
///
/// Variations have no ordering semantics beyond declaration order; FIFO
/// fallback consumption walks them in the order they were declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub id: Identifier,
    pub name: String,
    pub stock: u64,
    pub price: Money,
    pub cost_price: Money,
}

/// A dated stock pool within a product.
///
/// Batches are consumed oldest-received first. A batch that reaches zero
/// quantity is skipped by the deduction engine but kept on the record -
/// receipt history still references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Identifier,
    pub quantity: u64,
    pub cost_price: Money,
    pub selling_price: Money,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// An inventory product: pricing plus its stock pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Display name.
    pub name: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Base selling price.
    pub price: Money,

    /// Base cost price (margin calculations).
    pub cost_price: Money,

    /// Tax configuration.
    pub tax: TaxDetail,

    /// Named stock pools, declaration order.
    pub variations: Vec<Variation>,

    /// Dated stock pools, consumed oldest-received first.
    pub batches: Vec<Batch>,
}

impl Product {
    /// Total stock across every pool (batches + variations).
    pub fn total_stock(&self) -> u64 {
        let batch_stock: u64 = self.batches.iter().map(|b| b.quantity).sum();
        let variation_stock: u64 = self.variations.iter().map(|v| v.stock).sum();
        batch_stock + variation_stock
    }

    /// Looks up a variation by id.
    pub fn variation(&self, id: &Identifier) -> Option<&Variation> {
        self.variations.iter().find(|v| &v.id == id)
    }
}

// =============================================================================
// Sync Queue Item
// =============================================================================

/// The kind of mutation a queue item replays against the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Create => f.write_str("create"),
            SyncAction::Update => f.write_str("update"),
            SyncAction::Delete => f.write_str("delete"),
        }
    }
}

/// Queue item lifecycle state. Transitions only move forward; `Synced` and
/// `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting to be drained.
    Pending,
    /// Currently being pushed to the authority.
    InFlight,
    /// Acknowledged by the authority.
    Synced,
    /// Given up: validation rejection or max attempts exceeded.
    Abandoned,
}

impl SyncState {
    /// True for states that no transition may leave.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Synced | SyncState::Abandoned)
    }

    /// The single authority on legal transitions.
    ///
    /// `InFlight -> Pending` is the rollback edge shared by retry and
    /// cancellation; everything else moves strictly forward.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Pending, SyncState::InFlight)
                | (SyncState::Pending, SyncState::Abandoned)
                | (SyncState::InFlight, SyncState::Synced)
                | (SyncState::InFlight, SyncState::Abandoned)
                | (SyncState::InFlight, SyncState::Pending)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Pending => f.write_str("pending"),
            SyncState::InFlight => f.write_str("in_flight"),
            SyncState::Synced => f.write_str("synced"),
            SyncState::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// One pending mutation in the durable sync ledger.
///
/// The payload is the domain document (sans sync metadata) exactly as it
/// will be sent to the authority. Queue content is independent of the
/// record store: a record may be deleted locally while its queue history
/// is still draining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// The queue item's own id (not the target record's).
    pub id: String,

    /// Which collection the target record belongs to.
    pub collection: CollectionName,

    /// What to replay against the authority.
    pub action: SyncAction,

    /// The record this mutation targets. Rewritten during identifier
    /// reconciliation while the item is still non-terminal.
    pub target_id: Identifier,

    /// Domain document to send (null for deletes).
    pub payload: serde_json::Value,

    /// Failed push attempts so far.
    pub attempts: u32,

    /// Last push error, if any (UI surfacing).
    pub last_error: Option<String>,

    /// Enqueue time; drain order within a collection.
    pub created_at: DateTime<Utc>,

    /// Lifecycle state.
    pub state: SyncState,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(qty: u64) -> Batch {
        Batch {
            id: Identifier::local(),
            quantity: qty,
            cost_price: Money::from_cents(100),
            selling_price: Money::from_cents(150),
            received_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        }
    }

    fn variation(stock: u64) -> Variation {
        Variation {
            id: Identifier::local(),
            name: "Large".to_string(),
            stock,
            price: Money::from_cents(200),
            cost_price: Money::from_cents(120),
        }
    }

    #[test]
    fn total_stock_sums_all_pools() {
        let product = Product {
            name: "Tea".to_string(),
            sku: "TEA-01".to_string(),
            price: Money::from_cents(150),
            cost_price: Money::from_cents(90),
            tax: TaxDetail::default(),
            variations: vec![variation(3), variation(4)],
            batches: vec![batch(5), batch(6)],
        };

        assert_eq!(product.total_stock(), 18);
    }

    #[test]
    fn sync_state_terminals() {
        assert!(SyncState::Synced.is_terminal());
        assert!(SyncState::Abandoned.is_terminal());
        assert!(!SyncState::Pending.is_terminal());
        assert!(!SyncState::InFlight.is_terminal());
    }

    #[test]
    fn sync_state_legal_transitions() {
        assert!(SyncState::Pending.can_transition_to(SyncState::InFlight));
        assert!(SyncState::Pending.can_transition_to(SyncState::Abandoned));
        assert!(SyncState::InFlight.can_transition_to(SyncState::Synced));
        assert!(SyncState::InFlight.can_transition_to(SyncState::Abandoned));
        assert!(SyncState::InFlight.can_transition_to(SyncState::Pending));
    }

    #[test]
    fn sync_state_illegal_transitions() {
        // terminal states never move
        assert!(!SyncState::Synced.can_transition_to(SyncState::Pending));
        assert!(!SyncState::Synced.can_transition_to(SyncState::Abandoned));
        assert!(!SyncState::Abandoned.can_transition_to(SyncState::Pending));
        // no skipping InFlight
        assert!(!SyncState::Pending.can_transition_to(SyncState::Synced));
    }

    #[test]
    fn collection_name_display_and_serde() {
        let name = CollectionName::from("products");
        assert_eq!(name.to_string(), "products");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"products\"");
    }
}
