//! Domain error model.

use thiserror::Error;

use crate::id::{ProductId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business-rule failures only. Store faults and timeouts are modelled by the
/// infrastructure layer and wrap this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive quantity, overproduction, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested lifecycle transition is not in the allowed set.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The work order is not in a state that accepts the operation.
    #[error("work order is {status}; operation requires {required}")]
    InvalidWorkOrderState { status: String, required: String },

    /// The product has no active bill of materials (or the active one has no lines).
    #[error("no active bill of materials for product {product_id}")]
    NoActiveBom { product_id: ProductId },

    /// More than one bill of materials is flagged active for the product.
    #[error("{count} active bills of materials for product {product_id}; expected exactly one")]
    AmbiguousActiveBom { product_id: ProductId, count: usize },

    /// A material line cannot be satisfied from the selected warehouse.
    #[error(
        "insufficient stock of {material_code} in warehouse {warehouse_id}: required {required}, available {available}"
    )]
    InsufficientStock {
        material_id: ProductId,
        material_code: String,
        warehouse_id: WarehouseId,
        required: i64,
        available: i64,
    },

    /// Debit and credit totals differ.
    #[error("journal is unbalanced: debits {debit} != credits {credit}")]
    UnbalancedJournal { debit: i64, credit: i64 },

    /// A journal line references an account missing from the chart of accounts.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable code, used in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::InvalidWorkOrderState { .. } => "invalid_work_order_state",
            DomainError::NoActiveBom { .. } => "no_active_bom",
            DomainError::AmbiguousActiveBom { .. } => "ambiguous_active_bom",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::UnbalancedJournal { .. } => "unbalanced_journal",
            DomainError::UnknownAccount(_) => "unknown_account",
        }
    }
}
