pub mod health;
pub mod jobs;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use delta_registry::RegistryError;

/// Error half of every handler's result: a status plus `{"error": ...}`.
pub type ApiError = (StatusCode, Json<Value>);

/// Map a RegistryError to an HTTP response.
pub(crate) fn registry_err(e: RegistryError) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %e, "registry operation failed");
    }
    (status, Json(json!({ "error": e.to_string() })))
}
