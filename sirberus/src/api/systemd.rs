//! `/api/systemd` handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde_json::json;
use sirberus_shared::constants::events::{LOG_HEARTBEAT, STATUS_HEARTBEAT};
use sirberus_shared::constants::logs::CHANNEL_CAPACITY;

use super::query::LogQuery;
use super::sse::event_stream;
use super::{ApiError, AppState};
use crate::events::spawn_snapshot_stream;
use crate::systemd::{JournalSource, UnitOperation};

pub(super) async fn list_services(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let services = state.services.list().await?;
    Ok(Json(json!({
        "count": services.len(),
        "services": services,
    })))
}

pub(super) async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(unit = %name, "Getting service details");
    Ok(Json(state.services.details(&name).await?))
}

/// Live details, re-sent every status interval.
pub(super) async fn stream_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let name = state.services.resolve(&name).await?;
    let cancel = state.shutdown.child_token();

    let catalog = state.services.clone();
    let unit = name.clone();
    let snapshots = spawn_snapshot_stream(
        move || {
            let catalog = catalog.clone();
            let unit = unit.clone();
            async move { catalog.details(&unit).await }
        },
        state.status_interval,
        cancel.clone(),
        CHANNEL_CAPACITY,
    );

    tracing::info!(unit = %name, "Started service status stream");
    Ok(event_stream(
        snapshots.items,
        snapshots.errors,
        cancel.clone(),
        STATUS_HEARTBEAT,
        cancel.drop_guard(),
    ))
}

pub(super) async fn service_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let name = state.services.resolve(&name).await?;
    let request = query.request();
    let source = JournalSource::new(state.journalctl.clone(), name.clone());
    let session = state.streamer.spawn(source, request, &state.shutdown);

    tracing::info!(
        unit = %name,
        session = %session.id,
        lines = request.lines,
        follow = request.follow,
        "Started service log stream"
    );
    Ok(event_stream(
        session.lines,
        session.errors,
        session.cancel,
        LOG_HEARTBEAT,
        session.guard,
    ))
}

async fn run_operation(
    state: AppState,
    name: String,
    op: UnitOperation,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(unit = %name, operation = %op, "Service operation requested");
    let message = state.services.run(&name, op).await?;
    Ok(Json(json!({ "message": message })))
}

pub(super) async fn start_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, name, UnitOperation::Start).await
}

pub(super) async fn stop_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, name, UnitOperation::Stop).await
}

pub(super) async fn restart_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    run_operation(state, name, UnitOperation::Restart).await
}
