use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use shopfloor_accounting::JournalLine;
use shopfloor_core::{DomainError, JournalEntryId, ProductId, UserId, WarehouseId};
use shopfloor_inventory::{InventoryTransaction, MovementContext, StockKey, StockLevel};
use shopfloor_production::WorkOrder;

use crate::config::PostingAccounts;
use crate::store::ErpTransaction;

use super::bom_resolver::resolve_active_bom;
use super::journal::post_balanced_journal;
use super::EngineResult;

/// One production report, already validated against the work order's state.
#[derive(Debug, Clone)]
pub struct ProductionRun {
    pub quantity: i64,
    pub warehouse_id: WarehouseId,
    pub performed_by: Option<UserId>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Material issued for one BOM line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialConsumption {
    pub material_id: ProductId,
    pub material_code: String,
    pub quantity: i64,
    pub unit_cost: i64,
    pub total_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionOutcome {
    pub total_material_cost: i64,
    pub finished_unit_cost: i64,
    pub consumption: Vec<MaterialConsumption>,
    /// Material-to-WIP then WIP-to-finished-goods; empty when nothing was costed.
    pub journal_entry_ids: Vec<JournalEntryId>,
}

/// Consume raw materials for `run.quantity` finished units of `work_order`, receive the
/// finished goods and post the cost flow through WIP.
///
/// Writes through `tx` only; the caller owns commit/rollback. Any error leaves the
/// transaction in a state that must be rolled back.
pub async fn execute_production(
    tx: &mut dyn ErpTransaction,
    accounts: &PostingAccounts,
    work_order: &WorkOrder,
    run: &ProductionRun,
) -> EngineResult<ProductionOutcome> {
    if run.quantity <= 0 {
        return Err(DomainError::validation("quantity produced must be positive").into());
    }

    let resolved = resolve_active_bom(tx, work_order.product_id).await?;
    let ctx = MovementContext {
        work_order_id: work_order.id,
        warehouse_id: run.warehouse_id,
        occurred_at: run.occurred_at,
        performed_by: run.performed_by,
        notes: run.note.clone(),
    };
    let overflow = || DomainError::validation("material cost overflows");

    let mut total_material_cost: i64 = 0;
    let mut consumption = Vec::with_capacity(resolved.bom.lines.len());

    for (line, material) in resolved.lines() {
        let required = line.required_for(run.quantity)?;
        if required == 0 {
            continue;
        }

        let key = StockKey::new(material.id, run.warehouse_id);
        let mut level = match tx.stock_level(key).await? {
            Some(level) if level.covers(required) => level,
            other => {
                return Err(DomainError::InsufficientStock {
                    material_id: material.id,
                    material_code: material.code.clone(),
                    warehouse_id: run.warehouse_id,
                    required,
                    available: other.map(|l| l.quantity).unwrap_or(0),
                }
                .into());
            }
        };
        level.issue(required)?;
        tx.put_stock_level(&level).await?;

        let unit_cost = material.unit_cost();
        let line_value = required.checked_mul(unit_cost).ok_or_else(overflow)?;
        total_material_cost = total_material_cost.checked_add(line_value).ok_or_else(overflow)?;

        tx.append_inventory_transaction(&InventoryTransaction::production_out(
            &ctx,
            material.id,
            required,
            unit_cost,
            line_value,
        ))
        .await?;

        consumption.push(MaterialConsumption {
            material_id: material.id,
            material_code: material.code.clone(),
            quantity: required,
            unit_cost,
            total_value: line_value,
        });
    }

    let finished_key = StockKey::new(work_order.product_id, run.warehouse_id);
    let mut finished = tx
        .stock_level(finished_key)
        .await?
        .unwrap_or_else(|| StockLevel::empty(finished_key));
    finished.receive(run.quantity)?;
    tx.put_stock_level(&finished).await?;

    let finished_unit_cost = unit_cost_of(total_material_cost, run.quantity);
    tx.append_inventory_transaction(&InventoryTransaction::production_in(
        &ctx,
        work_order.product_id,
        run.quantity,
        finished_unit_cost,
        total_material_cost,
    ))
    .await?;

    let mut journal_entry_ids = Vec::new();
    if total_material_cost > 0 {
        let issue = post_balanced_journal(
            tx,
            &format!("Material issue to WIP for work order {}", work_order.number),
            &work_order.number,
            vec![
                JournalLine::debit(&accounts.work_in_process, total_material_cost),
                JournalLine::credit(&accounts.raw_materials, total_material_cost),
            ],
            run.occurred_at,
        )
        .await?;
        journal_entry_ids.push(issue.id);

        let receipt = post_balanced_journal(
            tx,
            &format!("Finished goods receipt from WIP for work order {}", work_order.number),
            &work_order.number,
            vec![
                JournalLine::debit(&accounts.finished_goods, total_material_cost),
                JournalLine::credit(&accounts.work_in_process, total_material_cost),
            ],
            run.occurred_at,
        )
        .await?;
        journal_entry_ids.push(receipt.id);
    }

    debug!(
        work_order_id = %work_order.id,
        quantity = run.quantity,
        total_material_cost,
        lines = consumption.len(),
        "production executed"
    );

    Ok(ProductionOutcome {
        total_material_cost,
        finished_unit_cost,
        consumption,
        journal_entry_ids,
    })
}

/// `total / quantity` in minor units, rounded half away from zero.
fn unit_cost_of(total: i64, quantity: i64) -> i64 {
    if quantity <= 0 || total == 0 {
        return 0;
    }
    let (t, q) = (i128::from(total), i128::from(quantity));
    let rounded = (2 * t.abs() + q) / (2 * q);
    (rounded * t.signum()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::store::{ErpStore, InMemoryErpStore};
    use rust_decimal_macros::dec;
    use shopfloor_accounting::{AccountKind, GlAccount};
    use shopfloor_core::{BomId, TenantId, WorkOrderId};
    use shopfloor_inventory::{InventoryTransactionKind, Product};
    use shopfloor_production::{BillOfMaterials, BomLine, WorkOrderStatus};

    struct Fixture {
        store: InMemoryErpStore,
        tenant: TenantId,
        warehouse: WarehouseId,
        work_order: WorkOrder,
        steel: ProductId,
        paint: ProductId,
    }

    async fn fixture(steel_on_hand: i64, paint_on_hand: i64) -> Fixture {
        let store = InMemoryErpStore::new();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let finished = ProductId::new();
        let steel = ProductId::new();
        let paint = ProductId::new();
        let now = Utc::now();
        let work_order = WorkOrder {
            id: WorkOrderId::new(),
            number: "WO-100".to_string(),
            product_id: finished,
            planned_qty: 100,
            actual_qty: 0,
            status: WorkOrderStatus::InProgress,
            start_date: None,
            due_date: None,
            warehouse_id: Some(warehouse),
            created_at: now,
            updated_at: now,
        };

        store
            .seed(tenant, |t| {
                for (id, code, cost) in [(steel, "STEEL", Some(1000)), (paint, "PAINT", Some(3))] {
                    t.insert_product(Product {
                        id,
                        code: code.to_string(),
                        name: code.to_string(),
                        cost_price: cost,
                    });
                }
                t.insert_bom(BillOfMaterials {
                    id: BomId::new(),
                    product_id: finished,
                    version: "v1".to_string(),
                    active: true,
                    lines: vec![
                        BomLine {
                            material_id: steel,
                            quantity: dec!(2),
                            waste_pct: dec!(5),
                        },
                        BomLine {
                            material_id: paint,
                            quantity: dec!(0.1),
                            waste_pct: dec!(0),
                        },
                    ],
                });
                t.set_stock(steel, warehouse, steel_on_hand);
                t.set_stock(paint, warehouse, paint_on_hand);
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

        Fixture {
            store,
            tenant,
            warehouse,
            work_order,
            steel,
            paint,
        }
    }

    fn run(quantity: i64, warehouse_id: WarehouseId) -> ProductionRun {
        ProductionRun {
            quantity,
            warehouse_id,
            performed_by: None,
            note: Some("shift A".to_string()),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn consumes_receives_and_posts() {
        let f = fixture(500, 10).await;
        let mut tx = f.store.begin(f.tenant).await.unwrap();
        let outcome = execute_production(
            tx.as_mut(),
            &PostingAccounts::default(),
            &f.work_order,
            &run(50, f.warehouse),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        // 105 steel at 1000 plus 5 paint at 3
        assert_eq!(outcome.total_material_cost, 105_015);
        assert_eq!(outcome.finished_unit_cost, 2_100);
        assert_eq!(outcome.consumption.len(), 2);
        assert_eq!(outcome.journal_entry_ids.len(), 2);

        let snap = f.store.snapshot(f.tenant).await;
        assert_eq!(snap.stock(f.steel, f.warehouse).unwrap().quantity, 395);
        assert_eq!(snap.stock(f.paint, f.warehouse).unwrap().available_qty, 5);
        assert_eq!(snap.stock(f.work_order.product_id, f.warehouse).unwrap().quantity, 50);

        let rows = snap.inventory_transactions();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, InventoryTransactionKind::ProductionOut);
        assert_eq!(rows[0].quantity, -105);
        assert_eq!(rows[0].total_value, 105_000);
        assert_eq!(rows[2].kind, InventoryTransactionKind::ProductionIn);
        assert_eq!(rows[2].quantity, 50);

        assert_eq!(snap.account("1310").unwrap().balance, -105_015);
        assert_eq!(snap.account("1320").unwrap().balance, 0);
        assert_eq!(snap.account("1300").unwrap().balance, 105_015);
    }

    #[tokio::test]
    async fn shortfall_on_a_later_line_aborts_everything() {
        let f = fixture(500, 1).await;
        let mut tx = f.store.begin(f.tenant).await.unwrap();
        let err = execute_production(
            tx.as_mut(),
            &PostingAccounts::default(),
            &f.work_order,
            &run(50, f.warehouse),
        )
        .await
        .unwrap_err();
        tx.rollback().await.unwrap();

        match err {
            EngineError::Domain(DomainError::InsufficientStock {
                material_code,
                required,
                available,
                ..
            }) => {
                assert_eq!(material_code, "PAINT");
                assert_eq!(required, 5);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let snap = f.store.snapshot(f.tenant).await;
        assert_eq!(snap.stock(f.steel, f.warehouse).unwrap().quantity, 500);
        assert!(snap.inventory_transactions().is_empty());
        assert!(snap.journal_entries().is_empty());
    }

    #[tokio::test]
    async fn absent_stock_row_reports_zero_available() {
        let f = fixture(500, 10).await;
        let elsewhere = WarehouseId::new();
        let mut tx = f.store.begin(f.tenant).await.unwrap();
        let err = execute_production(
            tx.as_mut(),
            &PostingAccounts::default(),
            &f.work_order,
            &run(1, elsewhere),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(DomainError::InsufficientStock { available: 0, required: 3, .. })
        ));
    }

    #[tokio::test]
    async fn uncosted_materials_post_no_journal() {
        let f = fixture(500, 10).await;
        f.store
            .seed(f.tenant, |t| {
                for id in [f.steel, f.paint] {
                    t.insert_product(Product {
                        id,
                        code: "FREE".to_string(),
                        name: "Free issue".to_string(),
                        cost_price: None,
                    });
                }
            })
            .await;

        let mut tx = f.store.begin(f.tenant).await.unwrap();
        let outcome = execute_production(
            tx.as_mut(),
            &PostingAccounts::default(),
            &f.work_order,
            &run(10, f.warehouse),
        )
        .await
        .unwrap();
        assert_eq!(outcome.total_material_cost, 0);
        assert_eq!(outcome.finished_unit_cost, 0);
        assert!(outcome.journal_entry_ids.is_empty());
    }

    #[test]
    fn unit_cost_rounds_half_away_from_zero() {
        assert_eq!(unit_cost_of(105_000, 50), 2_100);
        assert_eq!(unit_cost_of(10, 4), 3);
        assert_eq!(unit_cost_of(10, 3), 3);
        assert_eq!(unit_cost_of(0, 7), 0);
    }
}
