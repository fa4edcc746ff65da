use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use shopfloor_events::{EventEnvelope, InMemoryEventBus};
use shopfloor_infra::{
    EngineConfig, ErpStore, InMemoryErpStore, PostgresErpStore, WorkOrderEvent, WorkOrderService,
};

pub type WorkOrderBus = InMemoryEventBus<EventEnvelope<WorkOrderEvent>>;
pub type WorkOrders = WorkOrderService<Arc<dyn ErpStore>, Arc<WorkOrderBus>>;

/// Shared application services, handed to every handler via `Extension`.
pub struct AppServices {
    work_orders: WorkOrders,
    events: Arc<WorkOrderBus>,
}

impl AppServices {
    pub fn new(store: Arc<dyn ErpStore>, config: EngineConfig) -> Self {
        let events = Arc::new(WorkOrderBus::new());
        Self {
            work_orders: WorkOrderService::new(store, events.clone(), config),
            events,
        }
    }

    pub fn work_orders(&self) -> &WorkOrders {
        &self.work_orders
    }

    /// Post-commit work-order events.
    pub fn events(&self) -> &Arc<WorkOrderBus> {
        &self.events
    }
}

/// Wire services from the environment.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres (`DATABASE_URL`); otherwise an empty
/// in-memory store is used.
pub async fn build_services(config: EngineConfig) -> anyhow::Result<AppServices> {
    let persistent = std::env::var("USE_PERSISTENT_STORES")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let store: Arc<dyn ErpStore> = if persistent {
        let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set when USE_PERSISTENT_STORES is on")?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(config.transaction.max_wait)
            .connect(&url)
            .await
            .context("failed to connect to Postgres")?;
        let store = PostgresErpStore::new(pool);
        store.apply_schema().await.context("failed to apply schema")?;
        tracing::info!("using Postgres store");
        Arc::new(store)
    } else {
        tracing::info!("using in-memory store");
        Arc::new(InMemoryErpStore::new())
    };

    Ok(AppServices::new(store, config))
}
