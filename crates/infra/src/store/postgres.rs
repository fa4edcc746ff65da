//! Postgres-backed engine store.
//!
//! Each engine transaction is one `SERIALIZABLE` database transaction. Work-order and
//! stock rows are read `FOR UPDATE`, so two reports against the same order or material
//! serialize on the row lock instead of failing late.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `40001` | `Conflict` | Serialization failure |
//! | Database | `40P01` | `Conflict` | Deadlock detected |
//! | Database | `23505` | `Conflict` | Concurrent insert of the same key |
//! | Database | `23503`, `23514` | `Corrupt` | Row breaks a foreign key or check constraint |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` | Connection problems |
//! | ColumnDecode / Decode / ColumnNotFound | N/A | `Corrupt` | Row cannot be mapped |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use shopfloor_accounting::{AccountKind, GlAccount, JournalEntry};
use shopfloor_core::{BomId, ProductId, TenantId, WarehouseId, WorkOrderId};
use shopfloor_inventory::{InventoryTransaction, Product, StockKey, StockLevel, Warehouse};
use shopfloor_production::{BillOfMaterials, BomLine, WorkOrder, WorkOrderStatus};

use super::r#trait::{ErpStore, ErpTransaction, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_production_engine.sql");

const WORK_ORDER_SELECT: &str = r#"
    SELECT id, number, product_id, planned_qty, actual_qty, status,
           start_date, due_date, warehouse_id, created_at, updated_at
    FROM work_orders
    WHERE tenant_id = $1 AND id = $2
"#;

/// Postgres-backed engine store.
///
/// `Send + Sync`; the SQLx pool handles connection sharing.
#[derive(Debug, Clone)]
pub struct PostgresErpStore {
    pool: Arc<PgPool>,
}

impl PostgresErpStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the engine tables if they do not exist yet.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl ErpStore for PostgresErpStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn ErpTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PostgresTransaction { tx, tenant_id }))
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    tenant_id: TenantId,
}

impl PostgresTransaction {
    fn tenant(&self) -> Uuid {
        *self.tenant_id.as_uuid()
    }
}

#[async_trait]
impl ErpTransaction for PostgresTransaction {
    async fn work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
        let sql = format!("{WORK_ORDER_SELECT} FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(self.tenant())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("work_order", e))?;

        row.as_ref().map(work_order_from_row).transpose()
    }

    async fn find_work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
        let row = sqlx::query(WORK_ORDER_SELECT)
            .bind(self.tenant())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_work_order", e))?;

        row.as_ref().map(work_order_from_row).transpose()
    }

    async fn save_work_order(&mut self, wo: &WorkOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO work_orders (
                tenant_id, id, number, product_id, planned_qty, actual_qty, status,
                start_date, due_date, warehouse_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tenant_id, id) DO UPDATE SET
                planned_qty = EXCLUDED.planned_qty,
                actual_qty = EXCLUDED.actual_qty,
                status = EXCLUDED.status,
                start_date = EXCLUDED.start_date,
                due_date = EXCLUDED.due_date,
                warehouse_id = EXCLUDED.warehouse_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(self.tenant())
        .bind(wo.id.as_uuid())
        .bind(&wo.number)
        .bind(wo.product_id.as_uuid())
        .bind(wo.planned_qty)
        .bind(wo.actual_qty)
        .bind(wo.status.as_str())
        .bind(wo.start_date)
        .bind(wo.due_date)
        .bind(wo.warehouse_id.map(Uuid::from))
        .bind(wo.created_at)
        .bind(wo.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_work_order", e))?;
        Ok(())
    }

    async fn delete_work_order(&mut self, id: WorkOrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM work_orders WHERE tenant_id = $1 AND id = $2")
            .bind(self.tenant())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_work_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, code, name, cost_price FROM products WHERE tenant_id = $1 AND id = $2",
        )
        .bind(self.tenant())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;

        row.map(|r| {
            Ok(Product {
                id: ProductId::from_uuid(get(&r, "id")?),
                code: get(&r, "code")?,
                name: get(&r, "name")?,
                cost_price: get(&r, "cost_price")?,
            })
        })
        .transpose()
    }

    async fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, active, created_at
            FROM warehouses
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(self.tenant())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("warehouse", e))?;

        row.map(|r| {
            Ok(Warehouse {
                id: WarehouseId::from_uuid(get(&r, "id")?),
                code: get(&r, "code")?,
                name: get(&r, "name")?,
                active: get(&r, "active")?,
                created_at: get(&r, "created_at")?,
            })
        })
        .transpose()
    }

    async fn boms_for_product(&mut self, product_id: ProductId) -> Result<Vec<BillOfMaterials>, StoreError> {
        let headers = sqlx::query(
            r#"
            SELECT id, version, active
            FROM boms
            WHERE tenant_id = $1 AND product_id = $2
            ORDER BY version ASC
            "#,
        )
        .bind(self.tenant())
        .bind(product_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("boms_for_product", e))?;

        let mut boms = Vec::with_capacity(headers.len());
        for header in headers {
            let bom_id: Uuid = get(&header, "id")?;
            let lines = sqlx::query(
                r#"
                SELECT material_id, quantity, waste_pct
                FROM bom_lines
                WHERE tenant_id = $1 AND bom_id = $2
                ORDER BY line_no ASC
                "#,
            )
            .bind(self.tenant())
            .bind(bom_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("boms_for_product", e))?;

            let lines = lines
                .iter()
                .map(|r| {
                    Ok(BomLine {
                        material_id: ProductId::from_uuid(get(r, "material_id")?),
                        quantity: get(r, "quantity")?,
                        waste_pct: get(r, "waste_pct")?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            boms.push(BillOfMaterials {
                id: BomId::from_uuid(bom_id),
                product_id,
                version: get(&header, "version")?,
                active: get(&header, "active")?,
                lines,
            });
        }
        Ok(boms)
    }

    async fn stock_level(&mut self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT quantity, available_qty
            FROM stock_levels
            WHERE tenant_id = $1 AND product_id = $2 AND warehouse_id = $3
            FOR UPDATE
            "#,
        )
        .bind(self.tenant())
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_level", e))?;

        row.map(|r| {
            Ok(StockLevel {
                quantity: get(&r, "quantity")?,
                available_qty: get(&r, "available_qty")?,
                ..StockLevel::empty(key)
            })
        })
        .transpose()
    }

    async fn put_stock_level(&mut self, level: &StockLevel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (tenant_id, product_id, warehouse_id, quantity, available_qty)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, product_id, warehouse_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                available_qty = EXCLUDED.available_qty
            "#,
        )
        .bind(self.tenant())
        .bind(level.product_id.as_uuid())
        .bind(level.warehouse_id.as_uuid())
        .bind(level.quantity)
        .bind(level.available_qty)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("put_stock_level", e))?;
        Ok(())
    }

    async fn append_inventory_transaction(&mut self, row: &InventoryTransaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                tenant_id, id, product_id, warehouse_id, work_order_id, kind,
                quantity, unit_cost, total_value, occurred_at, performed_by, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(self.tenant())
        .bind(row.id.as_uuid())
        .bind(row.product_id.as_uuid())
        .bind(row.warehouse_id.as_uuid())
        .bind(row.work_order_id.map(Uuid::from))
        .bind(row.kind.as_str())
        .bind(row.quantity)
        .bind(row.unit_cost)
        .bind(row.total_value)
        .bind(row.occurred_at)
        .bind(row.performed_by.map(Uuid::from))
        .bind(row.notes.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_inventory_transaction", e))?;
        Ok(())
    }

    async fn count_inventory_transactions(&mut self, work_order_id: WorkOrderId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_transactions WHERE tenant_id = $1 AND work_order_id = $2",
        )
        .bind(self.tenant())
        .bind(work_order_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_inventory_transactions", e))?;
        Ok(count.max(0) as u64)
    }

    async fn gl_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT code, name, kind, balance
            FROM gl_accounts
            WHERE tenant_id = $1 AND code = ANY($2)
            ORDER BY code ASC
            "#,
        )
        .bind(self.tenant())
        .bind(codes)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("gl_accounts", e))?;

        rows.iter()
            .map(|r| {
                let kind: String = get(r, "kind")?;
                Ok(GlAccount {
                    code: get(r, "code")?,
                    name: get(r, "name")?,
                    kind: AccountKind::parse(&kind)
                        .ok_or_else(|| StoreError::Corrupt(format!("unknown account kind {kind:?}")))?,
                    balance: get(r, "balance")?,
                })
            })
            .collect()
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (tenant_id, id, description, reference, entry_date, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(self.tenant())
        .bind(entry.id.as_uuid())
        .bind(&entry.description)
        .bind(&entry.reference)
        .bind(entry.entry_date)
        .bind(entry.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_journal_entry", e))?;

        for (line_no, line) in entry.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (tenant_id, entry_id, line_no, account_code, debit, credit)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(self.tenant())
            .bind(entry.id.as_uuid())
            .bind(line_no as i32)
            .bind(&line.account_code)
            .bind(line.debit)
            .bind(line.credit)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_journal_entry", e))?;
        }
        Ok(())
    }

    async fn increment_account_balance(&mut self, code: &str, delta: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE gl_accounts SET balance = balance + $3 WHERE tenant_id = $1 AND code = $2",
        )
        .bind(self.tenant())
        .bind(code)
        .bind(delta)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("increment_account_balance", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("account {code} vanished mid-transaction")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn work_order_from_row(row: &PgRow) -> Result<WorkOrder, StoreError> {
    let status: String = get(row, "status")?;
    let warehouse_id: Option<Uuid> = get(row, "warehouse_id")?;
    Ok(WorkOrder {
        id: WorkOrderId::from_uuid(get(row, "id")?),
        number: get(row, "number")?,
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        planned_qty: get(row, "planned_qty")?,
        actual_qty: get(row, "actual_qty")?,
        status: WorkOrderStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown work order status {status:?}")))?,
        start_date: get(row, "start_date")?,
        due_date: get(row, "due_date")?,
        warehouse_id: warehouse_id.map(WarehouseId::from_uuid),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_)) => {
            StoreError::Corrupt(format!("row decode failed in {}: {}", operation, e))
        }
        other => StoreError::Unavailable(format!("{} failed: {}", operation, other)),
    }
}
