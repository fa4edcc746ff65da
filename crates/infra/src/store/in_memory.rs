use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use shopfloor_accounting::{GlAccount, JournalEntry};
use shopfloor_core::{ProductId, TenantId, WarehouseId, WorkOrderId};
use shopfloor_inventory::{InventoryTransaction, Product, StockKey, StockLevel, Warehouse};
use shopfloor_production::{BillOfMaterials, WorkOrder};

use super::r#trait::{ErpStore, ErpTransaction, StoreError};

/// All engine tables of one tenant.
///
/// Also used as the seeding and inspection surface of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct TenantTables {
    products: HashMap<ProductId, Product>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    boms: Vec<BillOfMaterials>,
    work_orders: HashMap<WorkOrderId, WorkOrder>,
    stock: BTreeMap<StockKey, StockLevel>,
    inventory_transactions: Vec<InventoryTransaction>,
    accounts: BTreeMap<String, GlAccount>,
    journal_entries: Vec<JournalEntry>,
}

impl TenantTables {
    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn insert_warehouse(&mut self, warehouse: Warehouse) {
        self.warehouses.insert(warehouse.id, warehouse);
    }

    pub fn insert_bom(&mut self, bom: BillOfMaterials) {
        self.boms.push(bom);
    }

    pub fn insert_work_order(&mut self, work_order: WorkOrder) {
        self.work_orders.insert(work_order.id, work_order);
    }

    pub fn insert_account(&mut self, account: GlAccount) {
        self.accounts.insert(account.code.clone(), account);
    }

    pub fn remove_account(&mut self, code: &str) -> Option<GlAccount> {
        self.accounts.remove(code)
    }

    /// Set on-hand and available for a (product, warehouse) pair.
    pub fn set_stock(&mut self, product_id: ProductId, warehouse_id: WarehouseId, quantity: i64) {
        let key = StockKey::new(product_id, warehouse_id);
        self.stock.insert(
            key,
            StockLevel {
                quantity,
                available_qty: quantity,
                ..StockLevel::empty(key)
            },
        );
    }

    pub fn work_order(&self, id: WorkOrderId) -> Option<&WorkOrder> {
        self.work_orders.get(&id)
    }

    pub fn stock(&self, product_id: ProductId, warehouse_id: WarehouseId) -> Option<&StockLevel> {
        self.stock.get(&StockKey::new(product_id, warehouse_id))
    }

    pub fn account(&self, code: &str) -> Option<&GlAccount> {
        self.accounts.get(code)
    }

    pub fn inventory_transactions(&self) -> &[InventoryTransaction] {
        &self.inventory_transactions
    }

    pub fn journal_entries(&self) -> &[JournalEntry] {
        &self.journal_entries
    }
}

/// In-memory transactional store.
///
/// One async mutex guards every tenant, so transactions are serial. A transaction works
/// on a copy of its tenant's tables; commit swaps the copy in, rollback drops it.
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default, Clone)]
pub struct InMemoryErpStore {
    tenants: Arc<Mutex<HashMap<TenantId, TenantTables>>>,
}

impl InMemoryErpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a tenant's tables outside any engine transaction (seeding).
    pub async fn seed<R>(&self, tenant_id: TenantId, f: impl FnOnce(&mut TenantTables) -> R) -> R {
        let mut tenants = self.tenants.lock().await;
        f(tenants.entry(tenant_id).or_default())
    }

    /// Copy of a tenant's committed tables.
    pub async fn snapshot(&self, tenant_id: TenantId) -> TenantTables {
        let tenants = self.tenants.lock().await;
        tenants.get(&tenant_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ErpStore for InMemoryErpStore {
    async fn begin(&self, tenant_id: TenantId) -> Result<Box<dyn ErpTransaction>, StoreError> {
        let guard = self.tenants.clone().lock_owned().await;
        let working = guard.get(&tenant_id).cloned().unwrap_or_default();
        Ok(Box::new(InMemoryTransaction {
            guard,
            tenant_id,
            working,
        }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<HashMap<TenantId, TenantTables>>,
    tenant_id: TenantId,
    working: TenantTables,
}

#[async_trait]
impl ErpTransaction for InMemoryTransaction {
    async fn work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self.working.work_orders.get(&id).cloned())
    }

    async fn find_work_order(&mut self, id: WorkOrderId) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self.working.work_orders.get(&id).cloned())
    }

    async fn save_work_order(&mut self, work_order: &WorkOrder) -> Result<(), StoreError> {
        self.working
            .work_orders
            .insert(work_order.id, work_order.clone());
        Ok(())
    }

    async fn delete_work_order(&mut self, id: WorkOrderId) -> Result<bool, StoreError> {
        Ok(self.working.work_orders.remove(&id).is_some())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self.working.warehouses.get(&id).cloned())
    }

    async fn boms_for_product(&mut self, product_id: ProductId) -> Result<Vec<BillOfMaterials>, StoreError> {
        Ok(self
            .working
            .boms
            .iter()
            .filter(|b| b.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn stock_level(&mut self, key: StockKey) -> Result<Option<StockLevel>, StoreError> {
        Ok(self.working.stock.get(&key).cloned())
    }

    async fn put_stock_level(&mut self, level: &StockLevel) -> Result<(), StoreError> {
        if level.quantity < 0 {
            return Err(StoreError::Corrupt(format!(
                "refusing negative on-hand for {:?}",
                level.key()
            )));
        }
        self.working.stock.insert(level.key(), level.clone());
        Ok(())
    }

    async fn append_inventory_transaction(&mut self, row: &InventoryTransaction) -> Result<(), StoreError> {
        self.working.inventory_transactions.push(row.clone());
        Ok(())
    }

    async fn count_inventory_transactions(&mut self, work_order_id: WorkOrderId) -> Result<u64, StoreError> {
        Ok(self
            .working
            .inventory_transactions
            .iter()
            .filter(|t| t.work_order_id == Some(work_order_id))
            .count() as u64)
    }

    async fn gl_accounts(&mut self, codes: &[String]) -> Result<Vec<GlAccount>, StoreError> {
        Ok(codes
            .iter()
            .filter_map(|c| self.working.accounts.get(c).cloned())
            .collect())
    }

    async fn insert_journal_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        if self.working.journal_entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Conflict(format!("journal entry {} already exists", entry.id)));
        }
        self.working.journal_entries.push(entry.clone());
        Ok(())
    }

    async fn increment_account_balance(&mut self, code: &str, delta: i64) -> Result<(), StoreError> {
        let account = self
            .working
            .accounts
            .get_mut(code)
            .ok_or_else(|| StoreError::Corrupt(format!("account {code} vanished mid-transaction")))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::Corrupt(format!("balance overflow on account {code}")))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            mut guard,
            tenant_id,
            working,
        } = *self;
        guard.insert(tenant_id, working);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
