//! HTTP API tests against in-memory service manager and container runtime.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sirberus::container::{
    ContainerCatalog, ContainerEntry, ContainerInspect, ContainerOperation, ContainerRuntime,
    ContainerStats, ExecAttach, TextStream,
};
use sirberus::metrics::{CgroupCpuReader, MetricSampler};
use sirberus::systemd::{
    JobResult, ServiceCatalog, ServiceManager, UnitOperation, UnitProperties, UnitSummary,
};
use sirberus::{AppState, SirberusError, SirberusResult, router};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for `oneshot`

#[derive(Default)]
struct FakeManager {
    jobs: Mutex<Vec<(String, UnitOperation)>>,
}

const NGINX_PROPS: &str = "Description=nginx\nLoadState=loaded\nActiveState=active\n\
    SubState=running\nMainPID=0\nMemoryCurrent=4096\nControlGroup=/system.slice/nginx.service\n\
    ActiveEnterTimestamp=@1714557600\n";

#[async_trait]
impl ServiceManager for FakeManager {
    async fn list_units(&self) -> SirberusResult<Vec<UnitSummary>> {
        Ok(vec![UnitSummary {
            name: "nginx.service".to_string(),
            description: "nginx".to_string(),
            load_state: "loaded".to_string(),
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
        }])
    }

    async fn unit_properties(&self, name: &str) -> SirberusResult<UnitProperties> {
        if name == "nginx.service" {
            Ok(UnitProperties::parse(NGINX_PROPS))
        } else {
            Err(SirberusError::NotFound(format!("Service {} not found", name)))
        }
    }

    async fn run_job(&self, name: &str, op: UnitOperation) -> SirberusResult<JobResult> {
        self.jobs.lock().push((name.to_string(), op));
        Ok(JobResult {
            result: "done".to_string(),
            detail: None,
        })
    }
}

struct FakeRuntime {
    container: ContainerInspect,
    exec_code: i64,
}

impl FakeRuntime {
    fn new(running: bool, exec_code: i64) -> Self {
        Self {
            container: ContainerInspect {
                id: "abcdef0123456789abcdef".to_string(),
                name: "/web".to_string(),
                image: "nginx:1.25".to_string(),
                path: "nginx".to_string(),
                state: if running { "running" } else { "exited" }.to_string(),
                running,
                started_at: Some("2024-05-01T10:00:00Z".to_string()),
                labels: BTreeMap::new(),
                ..Default::default()
            },
            exec_code,
        }
    }

    fn lookup(&self, id: &str) -> SirberusResult<ContainerInspect> {
        if id == "web" || self.container.id.starts_with(id) {
            Ok(self.container.clone())
        } else {
            Err(SirberusError::NotFound(format!("Container {} not found", id)))
        }
    }
}

fn chunks(items: &[&str]) -> TextStream {
    let items: Vec<SirberusResult<String>> = items.iter().map(|s| Ok(s.to_string())).collect();
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list(&self) -> SirberusResult<Vec<ContainerEntry>> {
        Ok(vec![ContainerEntry {
            id: self.container.id.clone(),
            image: self.container.image.clone(),
            status: "Up 3 hours".to_string(),
            ports: Vec::new(),
        }])
    }

    async fn inspect(&self, id: &str) -> SirberusResult<ContainerInspect> {
        self.lookup(id)
    }

    async fn stats(&self, _id: &str) -> SirberusResult<ContainerStats> {
        Ok(ContainerStats {
            cpu_total_ns: 1_000,
            memory_bytes: 2048,
        })
    }

    async fn apply(&self, id: &str, _op: ContainerOperation) -> SirberusResult<()> {
        self.lookup(id).map(|_| ())
    }

    async fn logs(&self, id: &str, _tail: usize, _follow: bool) -> SirberusResult<TextStream> {
        self.lookup(id)?;
        Ok(chunks(&["2024-05-01T10:00:00Z listening on :80\n"]))
    }

    async fn exec(&self, id: &str, _cmd: Vec<String>) -> SirberusResult<ExecAttach> {
        self.lookup(id)?;
        Ok(ExecAttach {
            exec_id: "exec-1".to_string(),
            output: chunks(&["bin\netc\n"]),
        })
    }

    async fn exec_exit_code(&self, _exec_id: &str) -> SirberusResult<Option<i64>> {
        Ok(Some(self.exec_code))
    }
}

fn app_with(runtime: Option<FakeRuntime>, journalctl: Option<PathBuf>) -> Router {
    let sampler = MetricSampler::default();
    let services = ServiceCatalog::new(
        Arc::new(FakeManager::default()),
        sampler.clone(),
        CgroupCpuReader::new("/nonexistent/cgroup"),
    );
    let containers = runtime.map(|r| ContainerCatalog::new(Arc::new(r), sampler.clone()));
    let mut state = AppState::new(services, containers, CancellationToken::new());
    if let Some(path) = journalctl {
        state = state.with_journalctl(path);
    }
    router(state)
}

async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, bytes) = raw_request(app, method, uri, body.map(|b| b.to_string())).await;
    let json: Value = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
    (status, json)
}

async fn raw_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<String>,
) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());

    let body = tokio::time::timeout(
        Duration::from_secs(10),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("response body did not complete")
    .unwrap();

    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_healthz() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/api/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));
}

/// Collects formatted tracing output for assertions.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[tokio::test]
async fn test_requests_are_access_logged() {
    let captured = CapturedLog::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = app_with(None, None);
    make_request(&app, Method::GET, "/healthz", None).await;
    make_request(&app, Method::GET, "/api/nothing", None).await;

    let text = captured.text();
    let healthz = text
        .lines()
        .find(|l| l.contains("path=/healthz"))
        .expect("no access log line for /healthz");
    assert!(healthz.contains("method=GET"));
    assert!(healthz.contains("status=200"));
    assert!(healthz.contains("latency_ms="));

    let missing = text
        .lines()
        .find(|l| l.contains("path=/api/nothing"))
        .expect("no access log line for unknown route");
    assert!(missing.contains("status=404"));
}

#[tokio::test]
async fn test_list_services() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/api/systemd", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["services"][0]["name"], "nginx.service");
    assert_eq!(body["services"][0]["is_running"], true);
    // cgroup root does not exist, so the reading degrades instead of failing
    assert_eq!(body["services"][0]["cpu_percent"], 0.0);
}

#[tokio::test]
async fn test_service_details_and_not_found() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/api/systemd/nginx", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "nginx.service");
    assert_eq!(body["since"], "2024-05-01T10:00:00Z");

    let (status, body) = make_request(&app, Method::GET, "/api/systemd/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Service ghost.service not found" }));
}

#[tokio::test]
async fn test_invalid_service_name_is_bad_request() {
    let app = app_with(None, None);
    let (status, _) = make_request(&app, Method::GET, "/api/systemd/--all", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_service_actions() {
    let app = app_with(None, None);
    let (status, body) =
        make_request(&app, Method::POST, "/api/systemd/nginx/restart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Service nginx.service restarted successfully" })
    );

    let (status, _) = make_request(&app, Method::POST, "/api/systemd/ghost/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_service_logs_stream_without_follow() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("journalctl");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         echo '2024-05-01T10:00:00+0000 host app[1]: one'\n\
         echo '2024-05-01T10:00:01+0000 host app[1]: two'\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let app = app_with(None, Some(script));
    let (status, content_type, body) = raw_request(
        &app,
        Method::GET,
        "/api/systemd/nginx/logs?lines=2&follow=false",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/event-stream"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("event: log"), "got {text}");
    assert!(text.contains("data: 2024-05-01T10:00:00+0000: app[1]: one"));
    assert!(text.contains("data: 2024-05-01T10:00:01+0000: app[1]: two"));
    assert!(!text.contains("event: error"));
}

#[tokio::test]
async fn test_service_logs_unknown_unit_is_404_before_streaming() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/api/systemd/ghost/logs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Service ghost.service not found");
}

#[tokio::test]
async fn test_container_routes_without_runtime() {
    let app = app_with(None, None);
    let (status, body) = make_request(&app, Method::GET, "/api/container", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("no container runtime"));
}

#[tokio::test]
async fn test_list_and_inspect_containers() {
    let app = app_with(Some(FakeRuntime::new(true, 0)), None);
    let (status, body) = make_request(&app, Method::GET, "/api/container", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["containers"][0]["id"], "abcdef012345");
    assert_eq!(body["containers"][0]["name"], "web");
    assert_eq!(body["containers"][0]["status"], "Up 3 hours");
    assert_eq!(body["containers"][0]["memory_bytes"], 2048);

    let (status, body) = make_request(&app, Method::GET, "/api/container/web", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "running");

    let (status, body) = make_request(&app, Method::GET, "/api/container/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Container ghost not found" }));
}

#[tokio::test]
async fn test_container_action() {
    let app = app_with(Some(FakeRuntime::new(true, 0)), None);
    let (status, body) = make_request(&app, Method::POST, "/api/container/web/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Container web stopped successfully" }));
}

#[tokio::test]
async fn test_container_logs_end_for_stopped_container() {
    let app = app_with(Some(FakeRuntime::new(false, 0)), None);
    let (status, _, body) =
        raw_request(&app, Method::GET, "/api/container/web/logs?lines=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("data: 2024-05-01T10:00:00Z: listening on :80"), "got {text}");
}

#[tokio::test]
async fn test_exec_streams_output() {
    let app = app_with(Some(FakeRuntime::new(true, 0)), None);
    let (status, _, body) = raw_request(
        &app,
        Method::POST,
        "/api/container/web/exec",
        Some(json!({ "command": "ls /" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("data: bin"), "got {text}");
    assert!(text.contains("data: etc"));
    assert!(!text.contains("event: error"));
}

#[tokio::test]
async fn test_exec_nonzero_exit_is_error_event() {
    let app = app_with(Some(FakeRuntime::new(true, 3)), None);
    let (_, _, body) = raw_request(
        &app,
        Method::POST,
        "/api/container/web/exec",
        Some(json!({ "command": "ls /missing" }).to_string()),
    )
    .await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("event: error"), "got {text}");
    assert!(text.contains("data: command 'ls /missing' exited with code 3"));
}

#[tokio::test]
async fn test_exec_rejects_bad_requests() {
    let app = app_with(Some(FakeRuntime::new(true, 0)), None);
    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/container/web/exec",
        Some(json!({ "command": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Command cannot be empty");

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/container/web/exec",
        Some(json!({ "cmd": "ls" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[tokio::test]
async fn test_exec_unknown_container_is_404() {
    let app = app_with(Some(FakeRuntime::new(true, 0)), None);
    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/container/ghost/exec",
        Some(json!({ "command": "ls" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
