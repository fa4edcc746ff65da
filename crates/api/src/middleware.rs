use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use shopfloor_core::{TenantId, UserId};

use crate::app::errors;
use crate::context::{ActorContext, TenantContext};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Resolve tenant and actor from request headers.
///
/// The caller is trusted: authentication happens upstream. A missing or malformed
/// tenant header is rejected before any handler runs.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let tenant_id = extract_id::<TenantId>(req.headers(), TENANT_HEADER)?.ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_tenant",
            format!("{TENANT_HEADER} header is required"),
        )
    })?;
    let user_id = extract_id::<UserId>(req.headers(), USER_HEADER)?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    req.extensions_mut().insert(ActorContext::new(user_id));

    Ok(next.run(req).await)
}

fn extract_id<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Response> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };

    let invalid = || {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{name} header must be a UUID"),
        )
    };

    let value = value.to_str().map_err(|_| invalid())?.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<T>().map(Some).map_err(|_| invalid())
}
