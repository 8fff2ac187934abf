//! # Validation
//!
//! Business rule validation, applied at the service boundary before any
//! store write. Tagged structs already rule out type-level nonsense; this
//! module covers the rules the types cannot express.

use crate::deduction::DeductionLine;
use crate::error::ValidationError;
use crate::types::{Batch, Product};

/// Validates a product payload before it enters the store.
pub fn validate_product(product: &Product) -> Result<(), ValidationError> {
    if product.name.trim().is_empty() {
        return Err(ValidationError::Required { field: "name" });
    }
    if product.sku.trim().is_empty() {
        return Err(ValidationError::Required { field: "sku" });
    }
    if product.price.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "price" });
    }
    if product.cost_price.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "cost_price" });
    }
    for variation in &product.variations {
        if variation.name.trim().is_empty() {
            return Err(ValidationError::Required { field: "variation.name" });
        }
        if variation.price.is_negative() {
            return Err(ValidationError::NegativeAmount { field: "variation.price" });
        }
    }
    for batch in &product.batches {
        validate_batch(batch)?;
    }
    Ok(())
}

/// Validates a batch (receipt path and embedded batches alike).
pub fn validate_batch(batch: &Batch) -> Result<(), ValidationError> {
    if batch.cost_price.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "batch.cost_price" });
    }
    if batch.selling_price.is_negative() {
        return Err(ValidationError::NegativeAmount { field: "batch.selling_price" });
    }
    if batch.expires_at <= batch.received_at {
        return Err(ValidationError::InvalidRange {
            field: "batch.expires_at",
            reason: "expiry must be after receipt",
        });
    }
    Ok(())
}

/// Validates a deduction request before it reaches the engine.
pub fn validate_lines(lines: &[DeductionLine]) -> Result<(), ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::Required { field: "lines" });
    }
    for line in lines {
        if line.quantity == 0 {
            return Err(ValidationError::MustBePositive { field: "line.quantity" });
        }
    }
    Ok(())
}
