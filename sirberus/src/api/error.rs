//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sirberus_shared::errors::SirberusError;

/// An error rendered as `{"error": "<message>"}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<SirberusError> for ApiError {
    fn from(err: SirberusError) -> Self {
        let status = match &err {
            SirberusError::NotFound(_) => StatusCode::NOT_FOUND,
            SirberusError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SirberusError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SirberusError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %err, "Request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
