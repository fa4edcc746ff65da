use std::sync::Arc;

use anyhow::Context;

use shopfloor_api::app::{build_app, services::build_services};
use shopfloor_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopfloor_observability::init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    if config.default_warehouse.is_none() {
        tracing::warn!("SHOPFLOOR_DEFAULT_WAREHOUSE_ID not set; reports must name a warehouse");
    }
    let services = Arc::new(build_services(config).await?);
    let app = build_app(services);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
