use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{JournalEntryId, WarehouseId, WorkOrderId};
use shopfloor_events::Event;
use shopfloor_production::WorkOrderStatus;

/// Facts about a work order, published only after the transaction that produced them committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkOrderEvent {
    ProductionReported {
        work_order_id: WorkOrderId,
        quantity: i64,
        warehouse_id: WarehouseId,
        total_material_cost: i64,
        journal_entry_ids: Vec<JournalEntryId>,
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        work_order_id: WorkOrderId,
        from: WorkOrderStatus,
        to: WorkOrderStatus,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        work_order_id: WorkOrderId,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkOrderEvent {
    pub fn work_order_id(&self) -> WorkOrderId {
        match self {
            WorkOrderEvent::ProductionReported { work_order_id, .. }
            | WorkOrderEvent::StatusChanged { work_order_id, .. }
            | WorkOrderEvent::Updated { work_order_id, .. }
            | WorkOrderEvent::Deleted { work_order_id, .. } => *work_order_id,
        }
    }
}

impl Event for WorkOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkOrderEvent::ProductionReported { .. } => "production.work_order.production_reported",
            WorkOrderEvent::StatusChanged { .. } => "production.work_order.status_changed",
            WorkOrderEvent::Updated { .. } => "production.work_order.updated",
            WorkOrderEvent::Deleted { .. } => "production.work_order.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkOrderEvent::ProductionReported { occurred_at, .. }
            | WorkOrderEvent::StatusChanged { occurred_at, .. }
            | WorkOrderEvent::Updated { occurred_at, .. }
            | WorkOrderEvent::Deleted { occurred_at, .. } => *occurred_at,
        }
    }
}
