//! Per-request access log.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;

/// Log method, path, status and latency of every request.
///
/// For event streams the latency covers the time to the response head, not
/// the lifetime of the stream.
pub(crate) async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    if response.status().is_server_error() {
        tracing::warn!(method = %method, path = %path, status, latency_ms, "Request failed");
    } else {
        tracing::info!(method = %method, path = %path, status, latency_ms, "Request handled");
    }
    response
}
