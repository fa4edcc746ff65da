use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{DomainError, DomainResult, ProductId, WarehouseId, WorkOrderId};

/// Work order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Planned,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 5] = [
        WorkOrderStatus::Planned,
        WorkOrderStatus::InProgress,
        WorkOrderStatus::OnHold,
        WorkOrderStatus::Completed,
        WorkOrderStatus::Cancelled,
    ];

    /// Statuses reachable from `self` in one step.
    pub fn allowed_targets(self) -> &'static [WorkOrderStatus] {
        use WorkOrderStatus::*;
        match self {
            Planned => &[InProgress, OnHold, Cancelled],
            InProgress => &[OnHold, Cancelled, Completed],
            OnHold => &[InProgress, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: WorkOrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkOrderStatus::Planned => "PLANNED",
            WorkOrderStatus::InProgress => "IN_PROGRESS",
            WorkOrderStatus::OnHold => "ON_HOLD",
            WorkOrderStatus::Completed => "COMPLETED",
            WorkOrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

impl core::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fail with `InvalidTransition` unless `target` is reachable from `current`.
pub fn assert_transition(current: WorkOrderStatus, target: WorkOrderStatus) -> DomainResult<()> {
    if current.can_transition_to(target) {
        Ok(())
    } else {
        Err(DomainError::InvalidTransition {
            from: current.to_string(),
            to: target.to_string(),
        })
    }
}

/// A production run of `planned_qty` units of `product_id`.
///
/// Invariant: `0 <= actual_qty <= planned_qty`. Terminal work orders are frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub number: String,
    pub product_id: ProductId,
    pub planned_qty: i64,
    pub actual_qty: i64,
    pub status: WorkOrderStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Default warehouse for production reports against this order.
    pub warehouse_id: Option<WarehouseId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field-level edit of a non-terminal work order. `None` leaves a field unchanged.
///
/// `actual_qty` and `status` are deliberately absent: they only move through production
/// reports and transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderPatch {
    pub planned_qty: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub warehouse_id: Option<WarehouseId>,
}

impl WorkOrderPatch {
    pub fn is_empty(&self) -> bool {
        self == &WorkOrderPatch::default()
    }
}

/// Outcome of recording produced units on a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductionRecorded {
    pub previous_status: WorkOrderStatus,
    pub completed: bool,
}

impl WorkOrder {
    pub fn remaining_qty(&self) -> i64 {
        self.planned_qty - self.actual_qty
    }

    /// Percentage complete, rounded to the nearest whole percent and capped at 100.
    pub fn progress(&self) -> u8 {
        if self.planned_qty <= 0 {
            return 0;
        }
        let actual = self.actual_qty.max(0) as i128;
        let planned = self.planned_qty as i128;
        let pct = (actual * 200 + planned) / (planned * 2);
        pct.min(100) as u8
    }

    fn ensure_not_terminal(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidWorkOrderState {
                status: self.status.to_string(),
                required: "a non-terminal status".to_string(),
            });
        }
        Ok(())
    }

    /// Check that a report of `quantity` units is legal right now.
    ///
    /// Status is checked first, so a report against a non-running order is always an
    /// `InvalidWorkOrderState` regardless of the quantity.
    pub fn ensure_accepts_report(&self, quantity: i64) -> DomainResult<()> {
        if self.status != WorkOrderStatus::InProgress {
            return Err(DomainError::InvalidWorkOrderState {
                status: self.status.to_string(),
                required: WorkOrderStatus::InProgress.to_string(),
            });
        }
        if quantity <= 0 {
            return Err(DomainError::validation("quantity produced must be positive"));
        }
        if quantity > self.remaining_qty() {
            return Err(DomainError::validation(format!(
                "reporting {quantity} would exceed planned quantity {} (already produced {})",
                self.planned_qty, self.actual_qty
            )));
        }
        Ok(())
    }

    /// Record `quantity` finished units. Completes the order when the plan is met.
    pub fn record_production(
        &mut self,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<ProductionRecorded> {
        self.ensure_accepts_report(quantity)?;

        let previous_status = self.status;
        self.actual_qty += quantity;
        if self.start_date.is_none() {
            self.start_date = Some(now);
        }
        let completed = self.actual_qty == self.planned_qty;
        if completed {
            self.status = WorkOrderStatus::Completed;
        }
        self.updated_at = now;

        Ok(ProductionRecorded {
            previous_status,
            completed,
        })
    }

    /// Move to `target` if the lifecycle table allows it.
    pub fn transition_to(&mut self, target: WorkOrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        assert_transition(self.status, target)?;
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &WorkOrderPatch, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_terminal()?;
        if patch.is_empty() {
            return Err(DomainError::validation("patch contains no changes"));
        }

        let planned_qty = patch.planned_qty.unwrap_or(self.planned_qty);
        if planned_qty <= 0 {
            return Err(DomainError::validation("planned quantity must be positive"));
        }
        // Non-terminal orders always keep a positive remainder.
        if planned_qty <= self.actual_qty {
            return Err(DomainError::validation(format!(
                "planned quantity {planned_qty} must exceed produced quantity {}",
                self.actual_qty
            )));
        }

        let start_date = patch.start_date.or(self.start_date);
        let due_date = patch.due_date.or(self.due_date);
        if let (Some(start), Some(due)) = (start_date, due_date) {
            if due < start {
                return Err(DomainError::validation("due date cannot precede start date"));
            }
        }

        self.planned_qty = planned_qty;
        self.start_date = start_date;
        self.due_date = due_date;
        if let Some(w) = patch.warehouse_id {
            self.warehouse_id = Some(w);
        }
        self.updated_at = now;
        Ok(())
    }
}
