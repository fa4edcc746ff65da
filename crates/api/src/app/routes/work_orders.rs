use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
    routing::get,
};

use shopfloor_core::WorkOrderId;

use crate::app::dto::{PatchWorkOrderRequest, WorkOrderCommand};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new().route(
        "/:id",
        get(get_work_order).patch(patch_work_order).delete(delete_work_order),
    )
}

fn parse_id(id: &str) -> Result<WorkOrderId, Response> {
    id.parse::<WorkOrderId>()
        .map_err(errors::domain_error_to_response)
}

pub async fn get_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.work_orders().get(tenant.tenant_id(), id).await {
        Ok(details) => errors::json_ok(StatusCode::OK, details),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn patch_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<PatchWorkOrderRequest>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };
    let command = match body.into_command(actor.user_id()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let work_orders = services.work_orders();
    let tenant_id = tenant.tenant_id();
    let result = match command {
        WorkOrderCommand::ReportProduction(report) => work_orders
            .report_production(tenant_id, id, report)
            .await
            .map(|r| errors::json_ok(StatusCode::OK, r)),
        WorkOrderCommand::Transition(target) => work_orders
            .transition(tenant_id, id, target, actor.user_id())
            .await
            .map(|r| errors::json_ok(StatusCode::OK, r)),
        WorkOrderCommand::Patch(patch) => work_orders
            .patch(tenant_id, id, patch)
            .await
            .map(|wo| errors::json_ok(StatusCode::OK, wo)),
    };

    result.unwrap_or_else(errors::engine_error_to_response)
}

pub async fn delete_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.work_orders().delete(tenant.tenant_id(), id).await {
        Ok(()) => errors::json_ok(StatusCode::OK, serde_json::json!({ "id": id, "deleted": true })),
        Err(e) => errors::engine_error_to_response(e),
    }
}
