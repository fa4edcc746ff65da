use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use shopfloor_core::{UserId, WarehouseId};
use shopfloor_infra::engine::ProductionReport;
use shopfloor_production::{WorkOrderPatch, WorkOrderStatus};

use crate::app::errors;

pub const REPORT_PRODUCTION: &str = "REPORT_PRODUCTION";

// -------------------------
// Request DTOs
// -------------------------

/// Body of `PATCH /work-orders/{id}`.
///
/// One endpoint carries three kinds of request, told apart by which fields are present:
/// `action: "REPORT_PRODUCTION"`, `to_status`, or plain field changes.
#[derive(Debug, Default, Deserialize)]
pub struct PatchWorkOrderRequest {
    pub action: Option<String>,
    pub quantity_produced: Option<i64>,
    pub warehouse_id: Option<WarehouseId>,
    pub performed_by: Option<UserId>,
    pub note: Option<String>,

    pub to_status: Option<WorkOrderStatus>,

    pub planned_qty: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum WorkOrderCommand {
    ReportProduction(ProductionReport),
    Transition(WorkOrderStatus),
    Patch(WorkOrderPatch),
}

impl PatchWorkOrderRequest {
    /// Classify the request. `actor` is used when the body names no `performed_by`.
    pub fn into_command(self, actor: Option<UserId>) -> Result<WorkOrderCommand, axum::response::Response> {
        if let Some(action) = self.action {
            if action != REPORT_PRODUCTION {
                return Err(errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    format!("unknown action {action:?}; expected {REPORT_PRODUCTION}"),
                ));
            }
            let quantity = self.quantity_produced.ok_or_else(|| {
                errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "quantity_produced is required",
                )
            })?;
            return Ok(WorkOrderCommand::ReportProduction(ProductionReport {
                quantity,
                warehouse_id: self.warehouse_id,
                performed_by: self.performed_by.or(actor),
                note: self.note.filter(|n| !n.trim().is_empty()),
            }));
        }

        if let Some(target) = self.to_status {
            return Ok(WorkOrderCommand::Transition(target));
        }

        Ok(WorkOrderCommand::Patch(WorkOrderPatch {
            planned_qty: self.planned_qty,
            start_date: self.start_date,
            due_date: self.due_date,
            warehouse_id: self.warehouse_id,
        }))
    }
}
