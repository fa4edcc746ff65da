use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use shopfloor_core::DomainError;
use shopfloor_infra::{EngineError, StoreError};

pub fn engine_error_to_response(err: EngineError) -> Response {
    match err {
        EngineError::Domain(e) => domain_error_to_response(e),
        EngineError::Store(StoreError::Conflict(msg)) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("concurrent update, retry the request: {msg}"),
        ),
        EngineError::Store(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
        e @ EngineError::Timeout { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "timeout", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let status = match err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    json_error(status, err.code(), err.to_string())
}

/// `{ "success": false, "error": { "code", "message" } }`
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message.into(),
            },
        })),
    )
        .into_response()
}

/// `{ "success": true, "data": ... }`
pub fn json_ok(status: StatusCode, data: impl Serialize) -> Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "data": data,
        })),
    )
        .into_response()
}
