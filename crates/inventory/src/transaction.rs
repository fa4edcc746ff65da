use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{InventoryTransactionId, ProductId, UserId, WarehouseId, WorkOrderId};

/// Kind of stock movement recorded on the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryTransactionKind {
    PurchaseIn,
    SaleOut,
    ProductionIn,
    ProductionOut,
    Adjustment,
    TransferIn,
    TransferOut,
}

impl InventoryTransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryTransactionKind::PurchaseIn => "PURCHASE_IN",
            InventoryTransactionKind::SaleOut => "SALE_OUT",
            InventoryTransactionKind::ProductionIn => "PRODUCTION_IN",
            InventoryTransactionKind::ProductionOut => "PRODUCTION_OUT",
            InventoryTransactionKind::Adjustment => "ADJUSTMENT",
            InventoryTransactionKind::TransferIn => "TRANSFER_IN",
            InventoryTransactionKind::TransferOut => "TRANSFER_OUT",
        }
    }
}

/// Append-only audit row, one per stock mutation (never updated or deleted).
///
/// `quantity` is signed: issues are negative, receipts positive. Values are in minor
/// currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: InventoryTransactionId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub work_order_id: Option<WorkOrderId>,
    pub kind: InventoryTransactionKind,
    pub quantity: i64,
    pub unit_cost: i64,
    pub total_value: i64,
    pub occurred_at: DateTime<Utc>,
    pub performed_by: Option<UserId>,
    pub notes: Option<String>,
}

/// Fields shared by both production movements of one report.
#[derive(Debug, Clone)]
pub struct MovementContext {
    pub work_order_id: WorkOrderId,
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
    pub performed_by: Option<UserId>,
    pub notes: Option<String>,
}

impl InventoryTransaction {
    /// Raw-material issue into production (negative quantity).
    pub fn production_out(
        ctx: &MovementContext,
        material_id: ProductId,
        quantity: i64,
        unit_cost: i64,
        total_value: i64,
    ) -> Self {
        Self {
            id: InventoryTransactionId::new(),
            product_id: material_id,
            warehouse_id: ctx.warehouse_id,
            work_order_id: Some(ctx.work_order_id),
            kind: InventoryTransactionKind::ProductionOut,
            quantity: -quantity,
            unit_cost,
            total_value,
            occurred_at: ctx.occurred_at,
            performed_by: ctx.performed_by,
            notes: ctx.notes.clone(),
        }
    }

    /// Finished-goods receipt out of production (positive quantity).
    pub fn production_in(
        ctx: &MovementContext,
        product_id: ProductId,
        quantity: i64,
        unit_cost: i64,
        total_value: i64,
    ) -> Self {
        Self {
            id: InventoryTransactionId::new(),
            product_id,
            warehouse_id: ctx.warehouse_id,
            work_order_id: Some(ctx.work_order_id),
            kind: InventoryTransactionKind::ProductionIn,
            quantity,
            unit_cost,
            total_value,
            occurred_at: ctx.occurred_at,
            performed_by: ctx.performed_by,
            notes: ctx.notes.clone(),
        }
    }
}
