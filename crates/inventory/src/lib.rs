//! Inventory domain module: product master, warehouses, stock ledger rows and the
//! append-only movement audit trail.
//!
//! Pure domain logic only (no IO, no HTTP, no storage).

pub mod item;
pub mod stock;
pub mod transaction;

pub use item::{Product, Warehouse};
pub use stock::{StockKey, StockLevel};
pub use transaction::{InventoryTransaction, InventoryTransactionKind, MovementContext};
