//! Capture job handlers: create, list, get, lifecycle and state commits.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use delta_core::{Job, JobDefinition, ValidationError};
use delta_registry::api::{LifecycleResponse, UpdateStateRequest, UpdateStateResponse};
use delta_registry::RegistryError;

use super::{registry_err, ApiError};
use crate::state::AppState;

/// Unparseable ids cannot name a stored job, so they are reported as missing.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("job not found: {}", raw) })),
        )
    })
}

/// POST /jobs
pub async fn jobs_create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JobDefinition>, JsonRejection>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let Json(definition) = payload.map_err(|rejection| {
        registry_err(RegistryError::Validation(ValidationError::Malformed(
            rejection.body_text(),
        )))
    })?;

    let job = state
        .registry
        .create(definition)
        .await
        .map_err(registry_err)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs
pub async fn jobs_list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = state.registry.list().await.map_err(registry_err)?;
    Ok(Json(jobs))
}

/// GET /jobs/{id}
pub async fn jobs_get(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let id = parse_id(&raw)?;
    let job = state.registry.get(id).await.map_err(registry_err)?;
    Ok(Json(job))
}

/// POST /jobs/{id}/start
pub async fn jobs_start(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let id = parse_id(&raw)?;
    let job = state.registry.start(id).await.map_err(registry_err)?;
    info!(job_id = %id, "capture job started");
    Ok(Json(LifecycleResponse {
        message: "Job started".into(),
        job,
    }))
}

/// POST /jobs/{id}/stop
pub async fn jobs_stop(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let id = parse_id(&raw)?;
    let job = state.registry.stop(id).await.map_err(registry_err)?;
    info!(job_id = %id, "capture job stopped");
    Ok(Json(LifecycleResponse {
        message: "Job stopped".into(),
        job,
    }))
}

/// POST /jobs/{id}/_update_state
///
/// Called by the worker after a batch is durable. An unknown job wins over a
/// missing or malformed body.
pub async fn jobs_update_state(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    payload: Result<Json<UpdateStateRequest>, JsonRejection>,
) -> Result<Json<UpdateStateResponse>, ApiError> {
    let id = parse_id(&raw)?;

    let capture_state = match payload {
        Ok(Json(UpdateStateRequest { state: Some(s) })) => s,
        Ok(Json(UpdateStateRequest { state: None })) => {
            state.registry.get(id).await.map_err(registry_err)?;
            return Err(registry_err(RegistryError::InvalidState(
                "payload must include 'state'".into(),
            )));
        }
        Err(rejection) => {
            state.registry.get(id).await.map_err(registry_err)?;
            return Err(registry_err(RegistryError::InvalidState(
                rejection.body_text(),
            )));
        }
    };

    state
        .registry
        .update_state(id, capture_state)
        .await
        .map_err(registry_err)?;
    Ok(Json(UpdateStateResponse { ok: true }))
}
