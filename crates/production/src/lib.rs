//! Production domain module: work-order lifecycle and bill-of-materials arithmetic.
//!
//! Pure domain logic only (no IO, no HTTP, no storage). Orchestration across stock and
//! ledger lives in `shopfloor-infra`.

pub mod bom;
pub mod work_order;

pub use bom::{
    ActiveBom, BillOfMaterials, BomLine, MaterialRequirement, required_quantity, requirements_for,
};
pub use work_order::{
    ProductionRecorded, WorkOrder, WorkOrderPatch, WorkOrderStatus, assert_transition,
};
