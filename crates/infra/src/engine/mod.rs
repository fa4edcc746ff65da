//! Production fulfillment and ledger posting, executed inside one store transaction.
//!
//! ```text
//! WorkOrderService (begin / bound / commit-or-rollback / publish)
//!   ↓
//! work-order state machine (shopfloor-production)
//!   ↓
//! bom_resolver → production executor → journal poster
//! ```
//!
//! Every function below the service takes an open `ErpTransaction`; none of them commit.

use std::time::Duration;

use thiserror::Error;

use shopfloor_core::DomainError;

use crate::store::StoreError;

pub mod bom_resolver;
pub mod events;
pub mod journal;
pub mod production;
pub mod work_orders;

pub use bom_resolver::{ResolvedBom, resolve_active_bom};
pub use events::WorkOrderEvent;
pub use journal::post_balanced_journal;
pub use production::{MaterialConsumption, ProductionOutcome, ProductionRun, execute_production};
pub use work_orders::{ProductionReport, ProductionReportResult, WorkOrderDetails, WorkOrderService};

/// Failure of an engine operation. Any of these means nothing was committed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transaction could not be obtained, or the unit of work ran too long.
    #[error("transaction {phase} exceeded {}ms", limit.as_millis())]
    Timeout { phase: &'static str, limit: Duration },
}

impl EngineError {
    /// Deterministic rejection (as opposed to an infrastructure fault).
    pub fn is_business_rule(&self) -> bool {
        matches!(self, EngineError::Domain(_))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
