//! # Error Types
//!
//! Domain error types for stockline-core.
//!
//! ## Design Principles
//! 1. `thiserror` derive macros, never manual impls
//! 2. Context in every message (pool id, requested/available amounts)
//! 3. Errors are enum variants, never strings
//!
//! Deduction errors are business-rule rejections returned synchronously to
//! the caller - they are never queued, never retried, and never reach the
//! sync layer.

use thiserror::Error;

use crate::id::Identifier;

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Stock deduction rejected.
    #[error(transparent)]
    Deduction(#[from] DeductionError),

    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Deduction Error
// =============================================================================

/// Rejections from the inventory deduction engine.
///
/// Returned before any mutation is committed: the record the caller holds is
/// untouched whenever one of these comes back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeductionError {
    /// A line named a specific variation and that pool cannot cover it.
    #[error("insufficient stock in variation {pool}: requested {requested}, available {available}")]
    InsufficientStock {
        pool: Identifier,
        requested: u64,
        available: u64,
    },

    /// An unselected line exhausted every eligible pool (all batches, then
    /// all variations) with quantity still outstanding.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientTotalStock { requested: u64, available: u64 },

    /// A line named a variation the record does not have.
    #[error("unknown variation: {0}")]
    UnknownVariation(Identifier),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// A monetary field is negative where the domain forbids it.
    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },

    /// A quantity must be at least one.
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    /// A date range is inverted (e.g. a batch expiring before receipt).
    #[error("{field}: {reason}")]
    InvalidRange {
        field: &'static str,
        reason: &'static str,
    },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduction_error_message() {
        let err = DeductionError::InsufficientStock {
            pool: Identifier::remote("var-1"),
            requested: 5,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock in variation var-1: requested 5, available 3"
        );
    }

    #[test]
    fn test_validation_error_message() {
        let err = ValidationError::Required { field: "name" };
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::Required { field: "sku" }.into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
