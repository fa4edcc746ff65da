//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/bus/engine wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and their mapping to engine commands
//! - `errors.rs`: response envelopes and error-to-status mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    // Tenant-scoped routes: require the tenant header.
    let scoped = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::tenant_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        .layer(ServiceBuilder::new())
}
