//! Transactional store boundary for the production engine.
//!
//! The engine is written against `ErpStore`/`ErpTransaction` only; the in-memory and
//! Postgres implementations are interchangeable behind them.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryErpStore, TenantTables};
pub use postgres::PostgresErpStore;
pub use r#trait::{ErpStore, ErpTransaction, StoreError};
