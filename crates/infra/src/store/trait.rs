use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shopfloor_accounting::{GlAccount, JournalEntry};
use shopfloor_core::{ProductId, TenantId, WarehouseId, WorkOrderId};
use shopfloor_inventory::{InventoryTransaction, Product, StockKey, StockLevel, Warehouse};
use shopfloor_production::{BillOfMaterials, WorkOrder};

/// Store-level failure, distinct from business-rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed unexpectedly.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A concurrent transaction touched the same rows (serialization failure, deadlock,
    /// unique violation). The whole request may be retried by the caller.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A persisted row could not be mapped back into a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Transactional store holding the engine's tables for every tenant.
///
/// `begin` may wait (locks, pool checkout); callers bound that wait.
#[async_trait]
pub trait ErpStore: Send + Sync {
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn ErpTransaction>, StoreError>;
}

#[async_trait]
impl<S> ErpStore for Arc<S>
where
    S: ErpStore + ?Sized,
{
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn ErpTransaction>, StoreError> {
        (**self).begin(tenant_id).await
    }
}

/// One serializable unit of work, scoped to the tenant it was opened for.
///
/// Nothing written through a transaction is visible to others until `commit`. Dropping
/// a transaction without committing discards its writes.
///
/// Write ownership: stock rows and inventory transactions are written only by the
/// production executor; account balances and journal entries only by the journal
/// poster; work orders only by the work-order service.
#[async_trait]
pub trait ErpTransaction: Send {
    /// Load a work order, locking it for the rest of the transaction.
    async fn work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError>;
    /// Load a work order without taking a row lock. Read-only paths only.
    async fn find_work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError>;
    async fn save_work_order(&mut self, work_order: &WorkOrder) -> Result<(), StoreError>;
    /// Returns `false` when no such work order existed.
    async fn delete_work_order(&mut self, id: WorkOrderId) -> Result<bool, StoreError>;

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;
    /// Every BOM version recorded for `product_id`, active or not.
    async fn boms_for_product(&mut self, product_id: ProductId) -> Result<Vec<BillOfMaterials>, StoreError>;

    /// Load a stock row, locking it for the rest of the transaction.
    async fn stock_level(&mut self, key: StockKey) -> Result<Option<StockLevel>, StoreError>;
    /// Insert or overwrite the stock row for `level.key()`.
    async fn put_stock_level(&mut self, level: &StockLevel) -> Result<(), StoreError>;
    async fn append_inventory_transaction(&mut self, row: &InventoryTransaction) -> Result<(), StoreError>;
    async fn count_inventory_transactions(&mut self, work_order_id: WorkOrderId) -> Result<u64, StoreError>;

    /// Accounts among `codes` that exist; missing codes are simply absent.
    async fn gl_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, StoreError>;
    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError>;
    /// Atomically add `delta` to the cached balance of `code`.
    async fn increment_account_balance(&mut self, code: &str, delta: i64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
