use axum::http::StatusCode;
use axum::response::Response;

use crate::app::errors;

pub async fn health() -> Response {
    errors::json_ok(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}
