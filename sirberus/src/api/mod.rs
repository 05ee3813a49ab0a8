//! HTTP surface.
//!
//! ## Architecture
//!
//! - **AppState**: shared catalogs, the log streamer and the root cancellation token
//! - **systemd** / **container**: JSON and SSE handlers per backend
//! - **sse**: runs an `EventPublisher` per open stream and adapts it to axum's `Sse`
//! - **ApiError**: maps `SirberusError` to a status code and `{"error": ...}`
//! - **access**: request logging wrapped around every route

mod access;
mod container;
mod error;
mod query;
mod sse;
mod systemd;

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sirberus_shared::constants::events::STATUS_INTERVAL;
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio_util::sync::CancellationToken;

use crate::container::ContainerCatalog;
use crate::logs::LogStreamer;
use crate::systemd::ServiceCatalog;

pub use container::ExecRequest;
pub use error::ApiError;
pub use query::LogQuery;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: ServiceCatalog,
    /// `None` when no container runtime was found at startup.
    pub containers: Option<ContainerCatalog>,
    pub journalctl: PathBuf,
    pub streamer: LogStreamer,
    pub status_interval: Duration,
    /// Root of every stream's cancellation scope.
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("containers", &self.containers.is_some())
            .field("journalctl", &self.journalctl)
            .finish()
    }
}

impl AppState {
    pub fn new(
        services: ServiceCatalog,
        containers: Option<ContainerCatalog>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            services,
            containers,
            journalctl: PathBuf::from("journalctl"),
            streamer: LogStreamer::default(),
            status_interval: STATUS_INTERVAL,
            shutdown,
        }
    }

    pub fn with_journalctl(mut self, journalctl: impl Into<PathBuf>) -> Self {
        self.journalctl = journalctl.into();
        self
    }

    pub fn with_streamer(mut self, streamer: LogStreamer) -> Self {
        self.streamer = streamer;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    fn containers(&self) -> SirberusResult<&ContainerCatalog> {
        self.containers.as_ref().ok_or_else(|| {
            SirberusError::BackendUnavailable("no container runtime available".to_string())
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/systemd", get(systemd::list_services))
        .route("/api/systemd/{name}", get(systemd::get_service))
        .route("/api/systemd/{name}/stream", get(systemd::stream_service))
        .route("/api/systemd/{name}/logs", get(systemd::service_logs))
        .route("/api/systemd/{name}/start", post(systemd::start_service))
        .route("/api/systemd/{name}/stop", post(systemd::stop_service))
        .route("/api/systemd/{name}/restart", post(systemd::restart_service))
        .route("/api/container", get(container::list_containers))
        .route("/api/container/{id}", get(container::get_container))
        .route("/api/container/{id}/logs", get(container::container_logs))
        .route("/api/container/{id}/exec", post(container::exec_in_container))
        .route("/api/container/{id}/start", post(container::start_container))
        .route("/api/container/{id}/stop", post(container::stop_container))
        .route("/api/container/{id}/restart", post(container::restart_container))
        .fallback(not_found)
        .layer(middleware::from_fn(access::log_request))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
