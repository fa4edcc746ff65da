//! Work-order service: the transaction boundary of the engine.
//!
//! Every operation runs the same pipeline:
//!
//! ```text
//! begin (bounded by max_wait)
//!   ↓
//! unit of work (bounded by timeout): state machine, executor, journal poster
//!   ↓
//! commit on success / rollback on any error
//!   ↓
//! publish events (only after commit)
//! ```

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use shopfloor_core::{DomainError, TenantId, UserId, WarehouseId, WorkOrderId};
use shopfloor_events::{EventBus, EventEnvelope};
use shopfloor_production::{
    ActiveBom, MaterialRequirement, WorkOrder, WorkOrderPatch, WorkOrderStatus, assert_transition,
    requirements_for,
};

use crate::config::EngineConfig;
use crate::store::{ErpStore, ErpTransaction};

use super::events::WorkOrderEvent;
use super::production::{ProductionOutcome, ProductionRun, execute_production};
use super::{EngineError, EngineResult};

/// A production report as submitted by the shop floor.
#[derive(Debug, Clone, Default)]
pub struct ProductionReport {
    pub quantity: i64,
    pub warehouse_id: Option<WarehouseId>,
    pub performed_by: Option<UserId>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionReportResult {
    pub work_order: WorkOrder,
    pub warehouse_id: WarehouseId,
    pub outcome: ProductionOutcome,
}

/// Result of a status change. `auto_report` is set when completing an order produced
/// the remaining quantity.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    pub work_order: WorkOrder,
    pub auto_report: Option<ProductionOutcome>,
}

/// Read model for a single work order.
#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderDetails {
    #[serde(flatten)]
    pub work_order: WorkOrder,
    pub progress: u8,
    /// Active recipe scaled to the planned quantity; empty when the product has none.
    pub material_requirements: Vec<MaterialRequirement>,
}

/// Orchestrates work-order operations over a transactional store.
pub struct WorkOrderService<S, B> {
    store: S,
    bus: B,
    config: EngineConfig,
}

impl<S, B> WorkOrderService<S, B>
where
    S: ErpStore,
    B: EventBus<EventEnvelope<WorkOrderEvent>>,
{
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, work_order_id = %id))]
    pub async fn get(&self, tenant_id: TenantId, id: WorkOrderId) -> EngineResult<WorkOrderDetails> {
        let mut tx = self.begin(tenant_id).await?;
        let result = self.bounded(read_details(tx.as_mut(), id)).await;
        self.finish(tx, result, "work order read").await
    }

    /// Report finished units against a running work order.
    #[instrument(
        skip(self, report),
        fields(tenant_id = %tenant_id, work_order_id = %id, quantity = report.quantity)
    )]
    pub async fn report_production(
        &self,
        tenant_id: TenantId,
        id: WorkOrderId,
        report: ProductionReport,
    ) -> EngineResult<ProductionReportResult> {
        let now = Utc::now();
        let mut tx = self.begin(tenant_id).await?;
        let result = self
            .bounded(async {
                let mut work_order = load(tx.as_mut(), id).await?;
                self.report_within(tx.as_mut(), &mut work_order, report, now).await
            })
            .await;
        let (result, events) = self.finish(tx, result, "production reported").await?;
        self.publish(tenant_id, events);
        Ok(result)
    }

    /// Move a work order to `target`.
    ///
    /// Completing an order that still has a remainder reports that remainder first, in
    /// the same transaction.
    #[instrument(
        skip(self, actor),
        fields(tenant_id = %tenant_id, work_order_id = %id, target = %target)
    )]
    pub async fn transition(
        &self,
        tenant_id: TenantId,
        id: WorkOrderId,
        target: WorkOrderStatus,
        actor: Option<UserId>,
    ) -> EngineResult<TransitionResult> {
        let now = Utc::now();
        let mut tx = self.begin(tenant_id).await?;
        let result = self
            .bounded(async {
                let mut work_order = load(tx.as_mut(), id).await?;
                assert_transition(work_order.status, target)?;

                let remaining = work_order.remaining_qty();
                if target == WorkOrderStatus::Completed && remaining > 0 {
                    let report = ProductionReport {
                        quantity: remaining,
                        warehouse_id: None,
                        performed_by: actor,
                        note: Some("Auto-completed remaining quantity".to_string()),
                    };
                    let (report, events) = self.report_within(tx.as_mut(), &mut work_order, report, now).await?;
                    return Ok((
                        TransitionResult {
                            work_order: report.work_order,
                            auto_report: Some(report.outcome),
                        },
                        events,
                    ));
                }

                let from = work_order.status;
                work_order.transition_to(target, now)?;
                tx.save_work_order(&work_order).await?;
                let event = WorkOrderEvent::StatusChanged {
                    work_order_id: id,
                    from,
                    to: target,
                    occurred_at: now,
                };
                Ok((
                    TransitionResult {
                        work_order,
                        auto_report: None,
                    },
                    vec![event],
                ))
            })
            .await;
        let (result, events) = self.finish(tx, result, "status changed").await?;
        self.publish(tenant_id, events);
        Ok(result)
    }

    /// Apply a generic field patch (planned quantity, dates, warehouse).
    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, work_order_id = %id))]
    pub async fn patch(
        &self,
        tenant_id: TenantId,
        id: WorkOrderId,
        patch: WorkOrderPatch,
    ) -> EngineResult<WorkOrder> {
        let now = Utc::now();
        let mut tx = self.begin(tenant_id).await?;
        let result = self
            .bounded(async {
                let mut work_order = load(tx.as_mut(), id).await?;
                if let Some(warehouse_id) = patch.warehouse_id {
                    if tx.warehouse(warehouse_id).await?.is_none() {
                        return Err(EngineError::from(DomainError::not_found(format!("warehouse {warehouse_id}"))));
                    }
                }
                work_order.apply_patch(&patch, now)?;
                tx.save_work_order(&work_order).await?;
                let event = WorkOrderEvent::Updated {
                    work_order_id: id,
                    occurred_at: now,
                };
                Ok((work_order, vec![event]))
            })
            .await;
        let (work_order, events) = self.finish(tx, result, "work order updated").await?;
        self.publish(tenant_id, events);
        Ok(work_order)
    }

    /// Delete a work order that never moved inventory.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, work_order_id = %id))]
    pub async fn delete(&self, tenant_id: TenantId, id: WorkOrderId) -> EngineResult<()> {
        let now = Utc::now();
        let mut tx = self.begin(tenant_id).await?;
        let result = self
            .bounded(async {
                let work_order = load(tx.as_mut(), id).await?;
                let movements = tx.count_inventory_transactions(id).await?;
                if movements > 0 {
                    return Err(EngineError::from(DomainError::validation(format!(
                        "work order {} has {movements} inventory transactions and cannot be deleted",
                        work_order.number
                    ))));
                }
                tx.delete_work_order(id).await?;
                let event = WorkOrderEvent::Deleted {
                    work_order_id: id,
                    occurred_at: now,
                };
                Ok(((), vec![event]))
            })
            .await;
        let ((), events) = self.finish(tx, result, "work order deleted").await?;
        self.publish(tenant_id, events);
        Ok(())
    }

    /// Production report against an already loaded (and locked) work order.
    async fn report_within(
        &self,
        tx: &mut dyn ErpTransaction,
        work_order: &mut WorkOrder,
        report: ProductionReport,
        now: DateTime<Utc>,
    ) -> EngineResult<(ProductionReportResult, Vec<WorkOrderEvent>)> {
        work_order.ensure_accepts_report(report.quantity)?;
        let warehouse_id = self.select_warehouse(tx, report.warehouse_id, work_order).await?;

        let run = ProductionRun {
            quantity: report.quantity,
            warehouse_id,
            performed_by: report.performed_by,
            note: report.note,
            occurred_at: now,
        };
        let outcome = execute_production(tx, &self.config.accounts, work_order, &run).await?;

        let recorded = work_order.record_production(report.quantity, now)?;
        tx.save_work_order(work_order).await?;

        let mut events = vec![WorkOrderEvent::ProductionReported {
            work_order_id: work_order.id,
            quantity: report.quantity,
            warehouse_id,
            total_material_cost: outcome.total_material_cost,
            journal_entry_ids: outcome.journal_entry_ids.clone(),
            occurred_at: now,
        }];
        if recorded.completed {
            events.push(WorkOrderEvent::StatusChanged {
                work_order_id: work_order.id,
                from: recorded.previous_status,
                to: WorkOrderStatus::Completed,
                occurred_at: now,
            });
        }

        Ok((
            ProductionReportResult {
                work_order: work_order.clone(),
                warehouse_id,
                outcome,
            },
            events,
        ))
    }

    /// Explicit warehouse, else the order's own, else the configured default.
    async fn select_warehouse(
        &self,
        tx: &mut dyn ErpTransaction,
        explicit: Option<WarehouseId>,
        work_order: &WorkOrder,
    ) -> EngineResult<WarehouseId> {
        let warehouse_id = explicit
            .or(work_order.warehouse_id)
            .or(self.config.default_warehouse)
            .ok_or_else(|| {
                DomainError::validation("no warehouse given and no default warehouse configured")
            })?;

        let warehouse = tx
            .warehouse(warehouse_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("warehouse {warehouse_id}")))?;
        if !warehouse.active {
            return Err(DomainError::validation(format!("warehouse {} is inactive", warehouse.code)).into());
        }
        Ok(warehouse.id)
    }

    async fn begin(&self, tenant_id: TenantId) -> EngineResult<Box<dyn ErpTransaction>> {
        let limit = self.config.transaction.max_wait;
        match timeout(limit, self.store.begin(tenant_id)).await {
            Ok(tx) => Ok(tx?),
            Err(_) => {
                error!(max_wait_ms = limit.as_millis() as u64, "timed out waiting for a transaction");
                Err(EngineError::Timeout { phase: "begin", limit })
            }
        }
    }

    async fn bounded<T>(&self, work: impl Future<Output = EngineResult<T>>) -> EngineResult<T> {
        let limit = self.config.transaction.timeout;
        timeout(limit, work)
            .await
            .unwrap_or(Err(EngineError::Timeout { phase: "execution", limit }))
    }

    /// Commit on success, roll back on failure, and log the outcome.
    async fn finish<T>(
        &self,
        tx: Box<dyn ErpTransaction>,
        result: EngineResult<T>,
        what: &'static str,
    ) -> EngineResult<T> {
        match result {
            Ok(value) => {
                if let Err(e) = tx.commit().await {
                    error!(error = %e, "commit failed");
                    return Err(e.into());
                }
                info!("{what}");
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "rollback failed");
                }
                if e.is_business_rule() {
                    warn!(error = %e, code = e.domain().map(DomainError::code), "request rejected");
                } else {
                    error!(error = %e, "operation failed");
                }
                Err(e)
            }
        }
    }

    fn publish(&self, tenant_id: TenantId, events: Vec<WorkOrderEvent>) {
        for event in events {
            let subject = event.work_order_id();
            if let Err(e) = self.bus.publish(EventEnvelope::new(tenant_id, subject, event)) {
                warn!(error = ?e, work_order_id = %subject, "event publication failed after commit");
            }
        }
    }
}

async fn load(tx: &mut dyn ErpTransaction, id: WorkOrderId) -> EngineResult<WorkOrder> {
    tx.work_order(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("work order {id}")).into())
}

async fn read_details(tx: &mut dyn ErpTransaction, id: WorkOrderId) -> EngineResult<WorkOrderDetails> {
    let work_order = tx
        .find_work_order(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("work order {id}")))?;
    let material_requirements = match ActiveBom::select(tx.boms_for_product(work_order.product_id).await?) {
        ActiveBom::None => Vec::new(),
        ActiveBom::One(bom) => requirements_for(&bom, work_order.planned_qty)?,
        ActiveBom::Ambiguous(count) => {
            return Err(DomainError::AmbiguousActiveBom {
                product_id: work_order.product_id,
                count,
            }
            .into());
        }
    };
    Ok(WorkOrderDetails {
        progress: work_order.progress(),
        work_order,
        material_requirements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use shopfloor_accounting::{AccountKind, GlAccount, JournalEntry};
    use shopfloor_core::{BomId, JournalEntryId, ProductId};
    use shopfloor_events::InMemoryEventBus;
    use shopfloor_inventory::{
        InventoryTransaction, InventoryTransactionKind, Product, StockKey, StockLevel, Warehouse,
    };
    use shopfloor_production::{BillOfMaterials, BomLine};

    use crate::store::{InMemoryErpStore, StoreError};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<WorkOrderEvent>>>;

    struct Plant {
        store: InMemoryErpStore,
        bus: Bus,
        tenant: TenantId,
        warehouse: WarehouseId,
        finished: ProductId,
        material: ProductId,
    }

    impl Plant {
        /// One finished product built from 2 units of material M (5% waste, cost 1000),
        /// 500 units of M on hand, standard production accounts.
        async fn new() -> Self {
            let store = InMemoryErpStore::new();
            let tenant = TenantId::new();
            let warehouse = WarehouseId::new();
            let finished = ProductId::new();
            let material = ProductId::new();

            store
                .seed(tenant, |t| {
                    t.insert_warehouse(Warehouse {
                        id: warehouse,
                        code: "MAIN".to_string(),
                        name: "Main".to_string(),
                        active: true,
                        created_at: Utc::now(),
                    });
                    t.insert_product(Product {
                        id: finished,
                        code: "FG-1".to_string(),
                        name: "Bracket".to_string(),
                        cost_price: None,
                    });
                    t.insert_product(Product {
                        id: material,
                        code: "M".to_string(),
                        name: "Steel".to_string(),
                        cost_price: Some(1000),
                    });
                    t.insert_bom(BillOfMaterials {
                        id: BomId::new(),
                        product_id: finished,
                        version: "v1".to_string(),
                        active: true,
                        lines: vec![BomLine {
                            material_id: material,
                            quantity: dec!(2),
                            waste_pct: dec!(5),
                        }],
                    });
                    t.set_stock(material, warehouse, 500);
                    for (code, name) in [("1300", "Finished Goods"), ("1310", "Raw Materials"), ("1320", "WIP")] {
                        t.insert_account(GlAccount {
                            code: code.to_string(),
                            name: name.to_string(),
                            kind: AccountKind::Asset,
                            balance: 0,
                        });
                    }
                })
                .await;

            Self {
                store,
                bus: Arc::new(InMemoryEventBus::new()),
                tenant,
                warehouse,
                finished,
                material,
            }
        }

        async fn work_order(&self, planned: i64, status: WorkOrderStatus, warehouse: Option<WarehouseId>) -> WorkOrderId {
            let now = Utc::now();
            let wo = WorkOrder {
                id: WorkOrderId::new(),
                number: "WO-2026-0001".to_string(),
                product_id: self.finished,
                planned_qty: planned,
                actual_qty: 0,
                status,
                start_date: None,
                due_date: None,
                warehouse_id: warehouse,
                created_at: now,
                updated_at: now,
            };
            let id = wo.id;
            self.store.seed(self.tenant, |t| t.insert_work_order(wo)).await;
            id
        }

        fn service(&self) -> WorkOrderService<InMemoryErpStore, Bus> {
            self.service_with(EngineConfig::default())
        }

        fn service_with(&self, config: EngineConfig) -> WorkOrderService<InMemoryErpStore, Bus> {
            WorkOrderService::new(self.store.clone(), self.bus.clone(), config)
        }

        fn report(&self, quantity: i64) -> ProductionReport {
            ProductionReport {
                quantity,
                warehouse_id: Some(self.warehouse),
                ..ProductionReport::default()
            }
        }
    }

    fn domain(err: EngineError) -> DomainError {
        match err {
            EngineError::Domain(e) => e,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_report_consumes_material_and_posts_cost_flow() {
        let plant = Plant::new().await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, None).await;
        let events = plant.bus.subscribe();

        let result = plant
            .service()
            .report_production(plant.tenant, id, plant.report(50))
            .await
            .unwrap();

        assert_eq!(result.work_order.actual_qty, 50);
        assert_eq!(result.work_order.status, WorkOrderStatus::InProgress);
        assert!(result.work_order.start_date.is_some());
        assert_eq!(result.outcome.total_material_cost, 105_000);
        assert_eq!(result.outcome.consumption[0].quantity, 105);

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.material, plant.warehouse).unwrap().quantity, 395);
        assert_eq!(snap.stock(plant.finished, plant.warehouse).unwrap().quantity, 50);

        let entries = snap.journal_entries();
        assert_eq!(entries.len(), 2);
        for entry in entries {
            let totals = entry.totals();
            assert!(totals.is_balanced());
            assert_eq!(totals.debit, 105_000);
        }
        assert_eq!(snap.account("1310").unwrap().balance, -105_000);
        assert_eq!(snap.account("1320").unwrap().balance, 0);
        assert_eq!(snap.account("1300").unwrap().balance, 105_000);

        let published = events.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].tenant_id(), plant.tenant);
        assert!(matches!(
            published[0].payload(),
            WorkOrderEvent::ProductionReported { quantity: 50, .. }
        ));
    }

    #[tokio::test]
    async fn reporting_the_exact_remainder_completes_the_order() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, Some(plant.warehouse)).await;
        let service = plant.service();

        let first = service
            .report_production(plant.tenant, id, ProductionReport { quantity: 4, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(first.work_order.status, WorkOrderStatus::InProgress);
        let started = first.work_order.start_date;

        let events = plant.bus.subscribe();
        let second = service
            .report_production(plant.tenant, id, ProductionReport { quantity: 6, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(second.work_order.actual_qty, 10);
        assert_eq!(second.work_order.status, WorkOrderStatus::Completed);
        assert_eq!(second.work_order.start_date, started);

        let published: Vec<_> = events.drain().into_iter().map(|e| e.into_payload()).collect();
        assert!(matches!(
            published.last(),
            Some(WorkOrderEvent::StatusChanged { to: WorkOrderStatus::Completed, .. })
        ));
    }

    #[tokio::test]
    async fn overproduction_is_rejected_before_any_stock_moves() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;

        let err = plant
            .service()
            .report_production(plant.tenant, id, plant.report(11))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.material, plant.warehouse).unwrap().quantity, 500);
        assert!(snap.inventory_transactions().is_empty());
    }

    #[tokio::test]
    async fn reports_require_a_running_order() {
        let plant = Plant::new().await;
        for status in [WorkOrderStatus::Planned, WorkOrderStatus::OnHold, WorkOrderStatus::Cancelled] {
            let id = plant.work_order(10, status, None).await;
            let err = plant
                .service()
                .report_production(plant.tenant, id, plant.report(1))
                .await
                .unwrap_err();
            assert!(matches!(domain(err), DomainError::InvalidWorkOrderState { .. }));
        }
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back_the_report() {
        let plant = Plant::new().await;
        plant
            .store
            .seed(plant.tenant, |t| t.set_stock(plant.material, plant.warehouse, 100))
            .await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, None).await;

        let err = plant
            .service()
            .report_production(plant.tenant, id, plant.report(50))
            .await
            .unwrap_err();
        assert!(matches!(
            domain(err),
            DomainError::InsufficientStock { required: 105, available: 100, .. }
        ));

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.material, plant.warehouse).unwrap().quantity, 100);
        assert!(snap.stock(plant.finished, plant.warehouse).is_none());
        assert_eq!(snap.work_order(id).unwrap().actual_qty, 0);
        assert!(snap.journal_entries().is_empty());
    }

    #[tokio::test]
    async fn missing_account_rolls_back_stock_movements() {
        let plant = Plant::new().await;
        plant
            .store
            .seed(plant.tenant, |t| {
                t.remove_account("1320");
            })
            .await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;

        let err = plant
            .service()
            .report_production(plant.tenant, id, plant.report(5))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::UnknownAccount(ref code) if code == "1320"));

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.material, plant.warehouse).unwrap().quantity, 500);
        assert!(snap.inventory_transactions().is_empty());
        assert_eq!(snap.work_order(id).unwrap().actual_qty, 0);
        assert_eq!(snap.account("1310").unwrap().balance, 0);
    }

    #[tokio::test]
    async fn completing_with_a_remainder_reports_it_first() {
        let plant = Plant::new().await;
        let id = plant.work_order(20, WorkOrderStatus::InProgress, Some(plant.warehouse)).await;
        let service = plant.service();
        service
            .report_production(plant.tenant, id, ProductionReport { quantity: 5, ..Default::default() })
            .await
            .unwrap();

        let result = service
            .transition(plant.tenant, id, WorkOrderStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(result.work_order.status, WorkOrderStatus::Completed);
        assert_eq!(result.work_order.actual_qty, 20);
        let auto = result.auto_report.unwrap();
        // 2 * 15 * 1.05 = 31.5 -> 32
        assert_eq!(auto.consumption[0].quantity, 32);

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.finished, plant.warehouse).unwrap().quantity, 20);
        let ins = snap
            .inventory_transactions()
            .iter()
            .filter(|t| t.kind == InventoryTransactionKind::ProductionIn)
            .count();
        assert_eq!(ins, 2);
    }

    #[tokio::test]
    async fn transitions_follow_the_lifecycle_table() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::Planned, None).await;
        let service = plant.service();

        let err = service
            .transition(plant.tenant, id, WorkOrderStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));

        let events = plant.bus.subscribe();
        let result = service
            .transition(plant.tenant, id, WorkOrderStatus::InProgress, None)
            .await
            .unwrap();
        assert_eq!(result.work_order.status, WorkOrderStatus::InProgress);
        assert!(result.auto_report.is_none());
        assert!(matches!(
            events.try_recv().unwrap().into_payload(),
            WorkOrderEvent::StatusChanged {
                from: WorkOrderStatus::Planned,
                to: WorkOrderStatus::InProgress,
                ..
            }
        ));

        service
            .transition(plant.tenant, id, WorkOrderStatus::Cancelled, None)
            .await
            .unwrap();
        let err = service
            .transition(plant.tenant, id, WorkOrderStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn warehouse_falls_back_to_configured_default() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;

        let err = plant
            .service()
            .report_production(plant.tenant, id, ProductionReport { quantity: 1, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));

        let config = EngineConfig {
            default_warehouse: Some(plant.warehouse),
            ..EngineConfig::default()
        };
        let result = plant
            .service_with(config)
            .report_production(plant.tenant, id, ProductionReport { quantity: 1, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(result.warehouse_id, plant.warehouse);
    }

    #[tokio::test]
    async fn inactive_or_unknown_warehouse_is_rejected() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;

        let err = plant
            .service()
            .report_production(
                plant.tenant,
                id,
                ProductionReport {
                    quantity: 1,
                    warehouse_id: Some(WarehouseId::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound(_)));

        let closed = WarehouseId::new();
        plant
            .store
            .seed(plant.tenant, |t| {
                t.insert_warehouse(Warehouse {
                    id: closed,
                    code: "OLD".to_string(),
                    name: "Closed site".to_string(),
                    active: false,
                    created_at: Utc::now(),
                })
            })
            .await;
        let err = plant
            .service()
            .report_production(
                plant.tenant,
                id,
                ProductionReport {
                    quantity: 1,
                    warehouse_id: Some(closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn details_scale_the_recipe_to_the_plan() {
        let plant = Plant::new().await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, Some(plant.warehouse)).await;
        let service = plant.service();
        service
            .report_production(plant.tenant, id, ProductionReport { quantity: 33, ..Default::default() })
            .await
            .unwrap();

        let details = service.get(plant.tenant, id).await.unwrap();
        assert_eq!(details.progress, 33);
        assert_eq!(details.material_requirements.len(), 1);
        assert_eq!(details.material_requirements[0].required_qty, 210);
    }

    #[tokio::test]
    async fn deleting_is_blocked_once_inventory_moved() {
        let plant = Plant::new().await;
        let service = plant.service();

        let fresh = plant.work_order(10, WorkOrderStatus::Planned, None).await;
        service.delete(plant.tenant, fresh).await.unwrap();
        let err = service.get(plant.tenant, fresh).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound(_)));

        let used = plant.work_order(10, WorkOrderStatus::InProgress, None).await;
        service
            .report_production(plant.tenant, used, plant.report(1))
            .await
            .unwrap();
        let err = service.delete(plant.tenant, used).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
        assert!(plant.store.snapshot(plant.tenant).await.work_order(used).is_some());
    }

    #[tokio::test]
    async fn patch_keeps_the_plan_above_production() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;
        let service = plant.service();
        service
            .report_production(plant.tenant, id, plant.report(6))
            .await
            .unwrap();

        let err = service
            .patch(
                plant.tenant,
                id,
                WorkOrderPatch {
                    planned_qty: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));

        let updated = service
            .patch(
                plant.tenant,
                id,
                WorkOrderPatch {
                    planned_qty: Some(12),
                    warehouse_id: Some(plant.warehouse),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.planned_qty, 12);
        assert_eq!(updated.warehouse_id, Some(plant.warehouse));
    }

    #[tokio::test]
    async fn waiting_too_long_for_a_transaction_times_out() {
        let plant = Plant::new().await;
        let id = plant.work_order(10, WorkOrderStatus::InProgress, None).await;
        let config = EngineConfig {
            transaction: crate::config::TransactionOptions {
                max_wait: Duration::from_millis(50),
                timeout: Duration::from_secs(5),
            },
            ..EngineConfig::default()
        };

        let held = plant.store.begin(plant.tenant).await.unwrap();
        let err = plant
            .service_with(config)
            .report_production(plant.tenant, id, plant.report(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { phase: "begin", .. }));
        assert!(!err.is_business_rule());
        drop(held);

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.work_order(id).unwrap().actual_qty, 0);
    }

    #[tokio::test]
    async fn cost_moves_through_wip_in_two_ordered_entries() {
        let plant = Plant::new().await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, None).await;

        let result = plant
            .service()
            .report_production(plant.tenant, id, plant.report(50))
            .await
            .unwrap();
        let ids = &result.outcome.journal_entry_ids;
        assert_eq!(ids.len(), 2);

        let snap = plant.store.snapshot(plant.tenant).await;
        let lines_of = |entry_id: JournalEntryId| {
            let entry = snap
                .journal_entries()
                .iter()
                .find(|e| e.id == entry_id)
                .unwrap();
            let lines: Vec<_> = entry
                .lines
                .iter()
                .map(|l| (l.account_code.as_str(), l.debit, l.credit))
                .collect();
            (entry.reference.clone(), lines)
        };

        let (reference, issue) = lines_of(ids[0]);
        assert_eq!(reference, "WO-2026-0001");
        assert_eq!(issue, vec![("1320", 105_000, 0), ("1310", 0, 105_000)]);

        let (_, receipt) = lines_of(ids[1]);
        assert_eq!(receipt, vec![("1300", 105_000, 0), ("1320", 0, 105_000)]);

        let posted: Vec<_> = snap.journal_entries().iter().map(|e| e.id).collect();
        assert_eq!(posted, *ids);
    }

    /// In-memory store that can stall inventory appends and records which
    /// work-order read each call used.
    #[derive(Clone)]
    struct ObservedStore {
        inner: InMemoryErpStore,
        append_delay: Option<Duration>,
        reads: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl ObservedStore {
        fn new(inner: InMemoryErpStore, append_delay: Option<Duration>) -> Self {
            Self {
                inner,
                append_delay,
                reads: Arc::default(),
            }
        }

        fn reads(&self) -> Vec<&'static str> {
            self.reads.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ErpStore for ObservedStore {
        async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn ErpTransaction>, StoreError> {
            Ok(Box::new(ObservedTransaction {
                inner: self.inner.begin(tenant_id).await?,
                append_delay: self.append_delay,
                reads: self.reads.clone(),
            }))
        }
    }

    struct ObservedTransaction {
        inner: Box<dyn ErpTransaction>,
        append_delay: Option<Duration>,
        reads: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl ErpTransaction for ObservedTransaction {
        async fn work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
            self.reads.lock().unwrap().push("locking");
            self.inner.work_order(id).await
        }

        async fn find_work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
            self.reads.lock().unwrap().push("plain");
            self.inner.find_work_order(id).await
        }

        async fn save_work_order(&mut self, work_order: &WorkOrder) -> Result<(), StoreError> {
            self.inner.save_work_order(work_order).await
        }

        async fn delete_work_order(&mut self, id: WorkOrderId) -> Result<bool, StoreError> {
            self.inner.delete_work_order(id).await
        }

        async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.product(id).await
        }

        async fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
            self.inner.warehouse(id).await
        }

        async fn boms_for_product(&mut self, product_id: ProductId) -> Result<Vec<BillOfMaterials>, StoreError> {
            self.inner.boms_for_product(product_id).await
        }

        async fn stock_level(&mut self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
            self.inner.stock_level(key).await
        }

        async fn put_stock_level(&mut self, level: &StockLevel) -> Result<(), StoreError> {
            self.inner.put_stock_level(level).await
        }

        async fn append_inventory_transaction(&mut self, row: &InventoryTransaction) -> Result<(), StoreError> {
            if let Some(delay) = self.append_delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.append_inventory_transaction(row).await
        }

        async fn count_inventory_transactions(&mut self, work_order_id: WorkOrderId) -> Result<u64, StoreError> {
            self.inner.count_inventory_transactions(work_order_id).await
        }

        async fn gl_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, StoreError> {
            self.inner.gl_accounts(codes).await
        }

        async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
            self.inner.insert_journal_entry(entry).await
        }

        async fn increment_account_balance(&mut self, code: &str, delta: i64) -> Result<(), StoreError> {
            self.inner.increment_account_balance(code, delta).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[tokio::test]
    async fn running_past_the_timeout_aborts_without_partial_effects() {
        let plant = Plant::new().await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, None).await;
        let config = EngineConfig {
            transaction: crate::config::TransactionOptions {
                max_wait: Duration::from_secs(2),
                timeout: Duration::from_millis(50),
            },
            ..EngineConfig::default()
        };
        let store = ObservedStore::new(plant.store.clone(), Some(Duration::from_millis(500)));
        let events = plant.bus.subscribe();

        let err = WorkOrderService::new(store, plant.bus.clone(), config)
            .report_production(plant.tenant, id, plant.report(50))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { phase: "execution", .. }));
        assert!(!err.is_business_rule());

        let snap = plant.store.snapshot(plant.tenant).await;
        assert_eq!(snap.stock(plant.material, plant.warehouse).unwrap().quantity, 500);
        assert!(snap.stock(plant.finished, plant.warehouse).is_none());
        assert!(snap.inventory_transactions().is_empty());
        assert!(snap.journal_entries().is_empty());
        assert_eq!(snap.account("1310").unwrap().balance, 0);
        assert_eq!(snap.work_order(id).unwrap().actual_qty, 0);
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn reads_do_not_lock_the_work_order_but_reports_do() {
        let plant = Plant::new().await;
        let id = plant.work_order(100, WorkOrderStatus::InProgress, None).await;
        let store = ObservedStore::new(plant.store.clone(), None);
        let service = WorkOrderService::new(store.clone(), plant.bus.clone(), EngineConfig::default());

        let details = service.get(plant.tenant, id).await.unwrap();
        assert_eq!(details.work_order.id, id);
        assert_eq!(store.reads(), vec!["plain"]);

        service
            .report_production(plant.tenant, id, plant.report(1))
            .await
            .unwrap();
        assert_eq!(store.reads(), vec!["plain", "locking"]);
    }
}
