//! Infrastructure layer: engine configuration, transactional stores, and the production
//! fulfillment / ledger posting engine that runs on top of them.

pub mod config;
pub mod engine;
pub mod store;

pub use config::{ConfigError, EngineConfig, PostingAccounts, TransactionOptions};
pub use engine::{EngineError, EngineResult, WorkOrderEvent, WorkOrderService};
pub use store::{ErpStore, ErpTransaction, InMemoryErpStore, PostgresErpStore, StoreError};
