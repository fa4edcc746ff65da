use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{ProductId, WarehouseId};

/// Product master record, shared by finished goods and raw materials.
///
/// Maintained by the catalogue screens; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    /// Standard cost per stock unit, in minor currency units. `None` when never costed.
    pub cost_price: Option<i64>,
}

impl Product {
    /// Cost price used for consumption valuation (unset prices count as zero).
    pub fn unit_cost(&self) -> i64 {
        self.cost_price.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
