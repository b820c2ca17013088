//! The Admin API: JSON over HTTP POST, one route per `TargetManager`
//! operation. Every response is `{status, description, data?}` mirroring
//! the Ingest Server's `{status, msg}` convention.

use crate::manager::TargetManager;
use crate::patch::ConfigPatch;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use iast_model::{Endpoint, Finding, ScanStatus, TargetConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    status: u8,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Self {
        Self { status: 0, description: "ok", data: Some(data) }
    }
}

fn ok_empty() -> Envelope<()> {
    Envelope { status: 0, description: "ok", data: None }
}

fn err(description: &'static str) -> Envelope<()> {
    Envelope { status: 1, description, data: None }
}

/// Builds the admin router for `manager`, mounted by `iastd` alongside the
/// Ingest Server's router.
pub fn build_admin_router(manager: Arc<TargetManager>) -> Router {
    Router::new()
        .route("/scanner/new", post(scanner_new))
        .route("/scanner/kill", post(scanner_kill))
        .route("/scanner/config", post(scanner_config))
        .route("/scanner/get_config", post(scanner_get_config))
        .route("/scanner/auto_start", post(scanner_auto_start))
        .route("/scanner/auto_start_status", post(scanner_auto_start_status))
        .route("/model/get_all", post(model_get_all))
        .route("/model/get_url_info", post(model_get_url_info))
        .route("/model/clean_target", post(model_clean_target))
        .route("/model/get_report", post(model_get_report))
        .with_state(manager)
}

#[derive(Debug, Deserialize)]
struct HostPort {
    host: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct ScannerHandleBody {
    scanner_id: u64,
    host: String,
    port: u16,
    pid: Option<u32>,
}

async fn scanner_new(State(manager): State<Arc<TargetManager>>, Json(req): Json<HostPort>) -> impl IntoResponse {
    match manager.start_target(&req.host, req.port) {
        Ok(handle) => Json(Envelope::ok(ScannerHandleBody {
            scanner_id: handle.scanner_id,
            host: handle.host,
            port: handle.port,
            pid: handle.pid,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "scanner/new failed");
            Json(err("scanner/new failed")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScannerId {
    scanner_id: u64,
}

async fn scanner_kill(State(manager): State<Arc<TargetManager>>, Json(req): Json<ScannerId>) -> impl IntoResponse {
    match manager.stop_target(req.scanner_id) {
        Ok(()) => Json(ok_empty()).into_response(),
        Err(e) => {
            warn!(error = %e, "scanner/kill failed");
            Json(err("scanner/kill failed")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScannerConfigRequest {
    host: String,
    port: u16,
    #[serde(flatten)]
    patch: ConfigPatch,
}

async fn scanner_config(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<ScannerConfigRequest>,
) -> impl IntoResponse {
    match manager.set_config(&req.host, req.port, req.patch) {
        Ok(cfg) => Json(Envelope::ok(cfg)).into_response(),
        Err(e) => {
            warn!(error = %e, "scanner/config failed");
            Json(err("invalid config patch")).into_response()
        }
    }
}

async fn scanner_get_config(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<HostPort>,
) -> impl IntoResponse {
    match manager.get_config(&req.host, req.port) {
        Some(cfg) => Json(Envelope::ok(cfg)).into_response(),
        None => Json(err("unknown target")).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AutoStartRequest {
    enable: bool,
}

async fn scanner_auto_start(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<AutoStartRequest>,
) -> impl IntoResponse {
    manager.set_auto_start(req.enable);
    Json(ok_empty())
}

#[derive(Debug, Serialize)]
struct AutoStartStatus {
    enabled: bool,
}

async fn scanner_auto_start_status(State(manager): State<Arc<TargetManager>>) -> impl IntoResponse {
    Json(Envelope::ok(AutoStartStatus { enabled: manager.get_auto_start() }))
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_per_page")]
    per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct TargetList {
    targets: Vec<TargetConfig>,
}

async fn model_get_all(State(manager): State<Arc<TargetManager>>, Json(req): Json<Page>) -> impl IntoResponse {
    let targets = manager.list_targets(req.page, req.per_page);
    Json(Envelope::ok(TargetList { targets }))
}

#[derive(Debug, Deserialize)]
struct UrlInfoRequest {
    host: String,
    port: u16,
    #[serde(default = "default_status")]
    status: ScanStatus,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_per_page")]
    per_page: usize,
}

fn default_status() -> ScanStatus {
    ScanStatus::New
}

#[derive(Debug, Serialize)]
struct UrlList {
    endpoints: Vec<Endpoint>,
}

async fn model_get_url_info(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<UrlInfoRequest>,
) -> impl IntoResponse {
    let endpoints = manager.list_urls(&req.host, req.port, req.status, req.page, req.per_page);
    Json(Envelope::ok(UrlList { endpoints }))
}

#[derive(Debug, Deserialize)]
struct CleanTargetRequest {
    host: String,
    port: u16,
    #[serde(default)]
    url_only: bool,
}

async fn model_clean_target(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<CleanTargetRequest>,
) -> impl IntoResponse {
    match manager.clean_target(&req.host, req.port, req.url_only) {
        Ok(()) => Json(ok_empty()).into_response(),
        Err(e) => {
            warn!(error = %e, "model/clean_target failed");
            Json(err("target has a live scanner")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    host: String,
    port: u16,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_per_page")]
    per_page: usize,
}

#[derive(Debug, Serialize)]
struct ReportList {
    findings: Vec<Finding>,
}

async fn model_get_report(
    State(manager): State<Arc<TargetManager>>,
    Json(req): Json<ReportRequest>,
) -> impl IntoResponse {
    let findings = manager.get_report(&req.host, req.port, req.page, req.per_page);
    Json(Envelope::ok(ReportList { findings }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::{ScannerHandle, ScannerSpawner};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    struct StubSpawner {
        alive: AtomicBool,
    }

    impl ScannerSpawner for StubSpawner {
        fn spawn(&self, _id: u64, _host: &str, _port: u16, _config: &TargetConfig) -> Option<u32> {
            self.alive.store(true, Ordering::SeqCst);
            None
        }

        fn is_alive(&self, _handle: &ScannerHandle) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn stop(&self, _handle: &ScannerHandle) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    fn router() -> Router {
        let dir = tempfile::tempdir().unwrap();
        let spawner = Arc::new(StubSpawner { alive: AtomicBool::new(false) });
        let manager = Arc::new(TargetManager::new(dir.path(), spawner, None, 4, TargetConfig::default()));
        build_admin_router(manager)
    }

    async fn post(app: &Router, path: &str, body: serde_json::Value) -> serde_json::Value {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn scanner_new_then_get_all_lists_the_target() {
        let app = router();
        let created = post(&app, "/scanner/new", serde_json::json!({"host": "a.com", "port": 80})).await;
        assert_eq!(created["status"], 0);

        let all = post(&app, "/model/get_all", serde_json::json!({})).await;
        let targets = all["data"]["targets"].as_array().unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[tokio::test]
    async fn clean_target_while_live_reports_an_error_envelope() {
        let app = router();
        post(&app, "/scanner/new", serde_json::json!({"host": "a.com", "port": 80})).await;
        let resp = post(&app, "/model/clean_target", serde_json::json!({"host": "a.com", "port": 80})).await;
        assert_eq!(resp["status"], 1);
    }

    #[tokio::test]
    async fn auto_start_status_roundtrips() {
        let app = router();
        post(&app, "/scanner/auto_start", serde_json::json!({"enable": true})).await;
        let status = post(&app, "/scanner/auto_start_status", serde_json::json!({})).await;
        assert_eq!(status["data"]["enabled"], true);
    }
}
