use axum::Router;

pub mod system;
pub mod work_orders;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new().nest("/work-orders", work_orders::router())
}
