//! `/api/container` handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use sirberus_shared::constants::events::LOG_HEARTBEAT;

use super::query::LogQuery;
use super::sse::event_stream;
use super::{ApiError, AppState};
use crate::container::exec::spawn_exec;
use crate::container::{ContainerLogSource, ContainerOperation};

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub command: String,
}

pub(super) async fn list_containers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let containers = state.containers()?.list().await?;
    Ok(Json(json!({
        "count": containers.len(),
        "containers": containers,
    })))
}

pub(super) async fn get_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(container = %id, "Getting container details");
    Ok(Json(state.containers()?.details(&id).await?))
}

/// Container logs always follow.
pub(super) async fn container_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.containers()?;
    catalog.resolve(&id).await?;

    let request = query.follow_request();
    let source = ContainerLogSource::new(catalog.runtime(), id.clone());
    let session = state.streamer.spawn(source, request, &state.shutdown);

    tracing::info!(
        container = %id,
        session = %session.id,
        lines = request.lines,
        "Started container log stream"
    );
    Ok(event_stream(
        session.lines,
        session.errors,
        session.cancel,
        LOG_HEARTBEAT,
        session.guard,
    ))
}

pub(super) async fn exec_in_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ExecRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid request: {}", e.body_text())))?;
    if request.command.trim().is_empty() {
        return Err(ApiError::bad_request("Command cannot be empty"));
    }

    let catalog = state.containers()?;
    catalog.resolve(&id).await?;

    let cancel = state.shutdown.child_token();
    tracing::info!(container = %id, command = %request.command, "Executing command in container");
    let session = spawn_exec(catalog.runtime(), id, request.command, cancel.clone());

    Ok(event_stream(
        session.output,
        session.errors,
        cancel.clone(),
        LOG_HEARTBEAT,
        cancel.drop_guard(),
    ))
}

async fn run_operation(
    state: AppState,
    id: String,
    op: ContainerOperation,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(container = %id, operation = %op, "Container operation requested");
    let message = state.containers()?.run(&id, op).await?;
    Ok(Json(json!({ "message": message })))
}

pub(super) async fn start_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, id, ContainerOperation::Start).await
}

pub(super) async fn stop_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, id, ContainerOperation::Stop).await
}

pub(super) async fn restart_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, id, ContainerOperation::Restart).await
}
