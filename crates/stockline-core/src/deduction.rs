//! # Inventory Deduction Engine
//!
//! Consumes stock from a product's pools to satisfy a multi-line deduction
//! request, atomically.
//!
//! ## Consumption Order
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  Line names a variation?                                               │
//! │                                                                        │
//! │  YES ──► that variation covers the whole line, or the line fails       │
//! │                                                                        │
//! │  NO ───► 1. batches, received_at ascending (oldest first)              │
//! │             - a batch at quantity 0 is skipped, never removed          │
//! │          2. variations, declaration order, for any remainder           │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Check Then Commit
//! Feasibility for every line is established against a working copy before
//! anything is committed: if any line cannot be fully satisfied, the call
//! returns an error and the caller's record is untouched. Partial
//! consumption of earlier lines is never observable - not in the return
//! value, not in the persisted record.
//!
//! The engine has no store or queue dependency. It is a pure function; the
//! caller pushes the result through `RecordStore::update` + queue like any
//! other write.

use crate::error::DeductionError;
use crate::id::Identifier;
use crate::types::{Batch, Product};

/// One line of a deduction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionLine {
    /// When set, the line must be satisfied entirely from this variation.
    /// When unset, consumption is FIFO across batches, then variations.
    pub variation: Option<Identifier>,

    /// Units to deduct.
    pub quantity: u64,
}

impl DeductionLine {
    /// A line consumed FIFO from batches, then variations.
    pub fn fifo(quantity: u64) -> Self {
        DeductionLine {
            variation: None,
            quantity,
        }
    }

    /// A line pinned to a specific variation.
    pub fn from_variation(variation: Identifier, quantity: u64) -> Self {
        DeductionLine {
            variation: Some(variation),
            quantity,
        }
    }
}

/// Deducts every line from the product's stock pools, or deducts nothing.
///
/// Returns the fully-deducted product on success. On any error the caller's
/// product is untouched; no partial deduction is ever handed back.
pub fn deduct(product: &Product, lines: &[DeductionLine]) -> Result<Product, DeductionError> {
    let mut working = product.clone();

    // Lines apply sequentially against the working copy, so two lines
    // hitting the same pool see each other's consumption.
    for line in lines {
        apply_line(&mut working, line)?;
    }

    Ok(working)
}

/// Checks one line against the working copy, then consumes it.
fn apply_line(product: &mut Product, line: &DeductionLine) -> Result<(), DeductionError> {
    if line.quantity == 0 {
        return Ok(());
    }

    match &line.variation {
        Some(id) => {
            let variation = product
                .variations
                .iter_mut()
                .find(|v| &v.id == id)
                .ok_or_else(|| DeductionError::UnknownVariation(id.clone()))?;

            if variation.stock < line.quantity {
                return Err(DeductionError::InsufficientStock {
                    pool: id.clone(),
                    requested: line.quantity,
                    available: variation.stock,
                });
            }

            variation.stock -= line.quantity;
        }
        None => {
            let available = product.total_stock();
            if available < line.quantity {
                return Err(DeductionError::InsufficientTotalStock {
                    requested: line.quantity,
                    available,
                });
            }

            let mut remaining = line.quantity;

            // Oldest-received batch first. Stable sort on indices keeps
            // declaration order for batches received at the same moment.
            let mut order: Vec<usize> = (0..product.batches.len()).collect();
            order.sort_by_key(|&i| product.batches[i].received_at);

            for i in order {
                if remaining == 0 {
                    break;
                }
                let batch = &mut product.batches[i];
                let take = remaining.min(batch.quantity);
                batch.quantity -= take;
                remaining -= take;
            }

            for variation in product.variations.iter_mut() {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(variation.stock);
                variation.stock -= take;
                remaining -= take;
            }

            debug_assert_eq!(remaining, 0, "feasibility was checked up front");
        }
    }

    Ok(())
}

/// Appends a received batch to the product, keeping batches ordered by
/// receipt date (the restock path).
pub fn receive_batch(product: &Product, batch: Batch) -> Product {
    let mut updated = product.clone();
    let position = updated
        .batches
        .iter()
        .position(|b| b.received_at > batch.received_at)
        .unwrap_or(updated.batches.len());
    updated.batches.insert(position, batch);
    updated
}

// =============================================================================
// Unit Tests
// =============================================================================
