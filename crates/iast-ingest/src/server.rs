//! The Ingest Server's single route.

use crate::control::ControlDirective;
use crate::state::IngestState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use iast_model::{AgentSubmission, ModelError, Record};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: u8,
    msg: &'static str,
}

impl IngestResponse {
    fn ok() -> Self {
        Self { status: 0, msg: "ok" }
    }

    fn invalid() -> Self {
        Self { status: 1, msg: "data invalid" }
    }
}

/// Builds the Ingest Server's router: one POST route at `path`, sharing
/// `state` across every request (per-process cooperative concurrency).
pub fn build_router(path: &str, state: Arc<IngestState>) -> Router {
    Router::new().route(path, post(handle_ingest)).with_state(state)
}

async fn handle_ingest(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("application/json") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let submission: AgentSubmission = match serde_json::from_slice(&body) {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, "ingest: malformed json body");
            state.count_invalid();
            return Json(IngestResponse::invalid()).into_response();
        }
    };

    let scan_request_id = headers
        .get("scan-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let record = match Record::from_submission(submission, scan_request_id) {
        Ok(r) => r,
        Err(ModelError::Hostless) => {
            state.count_invalid();
            return Json(IngestResponse::invalid()).into_response();
        }
        Err(e) => {
            debug!(error = %e, "ingest: schema invalid");
            state.count_invalid();
            return Json(IngestResponse::invalid()).into_response();
        }
    };

    if record.is_replay() {
        route_replay(&state, record);
    } else {
        route_observed(&state, record);
    }

    Json(IngestResponse::ok()).into_response()
}

fn route_replay(state: &IngestState, record: Record) {
    let Some(inbox) = record.inbox_id() else {
        state.count_dropped_replay();
        return;
    };
    match state.router.correlator(inbox) {
        Some(correlator) => {
            correlator.deliver(record);
        }
        None => {
            warn!(inbox, "dropped rasp result: no scanner registered for inbox");
            state.count_dropped_replay();
        }
    }
}

fn route_observed(state: &IngestState, record: Record) {
    for directive in state.control.drain() {
        let ControlDirective::ClearLru { target } = directive;
        state.dedup.clear(&target);
    }

    let target = record.host_port();
    let sink = state.router.endpoint_sink(&record.host, record.port);
    state.dedup.check_and_insert(&target, &record, sink.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlChannel;
    use crate::router::TargetRouter;
    use iast_correlator::Correlator;
    use iast_dedup::{DedupEngine, EndpointSink};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    struct MemorySink {
        rows: Mutex<Vec<(String, String)>>,
    }

    impl EndpointSink for MemorySink {
        fn put(&self, target: &str, _record: &Record, fingerprint: &str) -> Result<bool, String> {
            let mut rows = self.rows.lock().unwrap();
            if rows.iter().any(|(t, f)| t == target && f == fingerprint) {
                return Ok(false);
            }
            rows.push((target.to_string(), fingerprint.to_string()));
            Ok(true)
        }
    }

    struct StubRouter {
        sink: Arc<MemorySink>,
        correlators: HashMap<String, Arc<Correlator>>,
    }

    impl TargetRouter for StubRouter {
        fn endpoint_sink(&self, _host: &str, _port: u16) -> Arc<dyn EndpointSink> {
            self.sink.clone()
        }

        fn correlator(&self, inbox: &str) -> Option<Arc<Correlator>> {
            self.correlators.get(inbox).cloned()
        }
    }

    fn submission_body(path: &str, scan_request_id: Option<&str>) -> (String, Vec<(String, String)>) {
        let body = format!(
            r#"{{"context":{{"requestId":"r1","json":null,"server":{{"language":"php","name":"apache","version":"1","os":"linux"}},"body":null,"method":"get","querystring":"id=1","path":"{path}","parameter":{{"id":["1"]}},"header":{{}},"nic":[],"hostname":"x.com","port":80}},"hook_info":[]}}"#
        );
        let mut hdrs = vec![("content-type".to_string(), "application/json".to_string())];
        if let Some(id) = scan_request_id {
            hdrs.push(("scan-request-id".to_string(), id.to_string()));
        }
        (body, hdrs)
    }

    fn test_state() -> (Arc<IngestState>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink { rows: Mutex::new(Vec::new()) });
        let router = Arc::new(StubRouter { sink: sink.clone(), correlators: HashMap::new() });
        let (_tx, control) = ControlChannel::new();
        let state = IngestState::new(DedupEngine::with_default_fingerprint(64), router, control);
        (state, sink)
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected_with_415() {
        let (state, _sink) = test_state();
        let app = build_router("/", state);
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "text/plain")
                    .body(axum::body::Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn non_post_method_is_rejected_with_405() {
        let (state, _sink) = test_state();
        let app = build_router("/", state);
        let resp = app
            .oneshot(axum::http::Request::builder().method("GET").uri("/").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn observed_record_is_persisted_and_deduped() {
        let (state, sink) = test_state();
        let app = build_router("/", state);
        let (body, hdrs) = submission_body("/a", None);

        let mut req = axum::http::Request::builder().method("POST").uri("/");
        for (k, v) in &hdrs {
            req = req.header(k, v);
        }
        let resp = app.clone().oneshot(req.body(axum::body::Body::from(body.clone())).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(sink.rows.lock().unwrap().len(), 1);

        let mut req2 = axum::http::Request::builder().method("POST").uri("/");
        for (k, v) in &hdrs {
            req2 = req2.header(k, v);
        }
        app.oneshot(req2.body(axum::body::Body::from(body)).unwrap()).await.unwrap();
        assert_eq!(sink.rows.lock().unwrap().len(), 1, "duplicate fingerprint must not add a row");
    }

    #[tokio::test]
    async fn replay_with_unregistered_inbox_is_dropped_and_counted() {
        let (state, _sink) = test_state();
        let state_for_assert = state.clone();
        let app = build_router("/", state);
        let (body, hdrs) = submission_body("/a", Some("0-abc"));
        let mut req = axum::http::Request::builder().method("POST").uri("/");
        for (k, v) in &hdrs {
            req = req.header(k, v);
        }
        app.oneshot(req.body(axum::body::Body::from(body)).unwrap()).await.unwrap();
        assert_eq!(state_for_assert.dropped_replay_count(), 1);
    }

    #[tokio::test]
    async fn replay_with_registered_inbox_is_delivered_to_correlator() {
        let sink = Arc::new(MemorySink { rows: Mutex::new(Vec::new()) });
        let correlator = Arc::new(Correlator::new(Duration::from_millis(200), 0));
        let mut correlators = HashMap::new();
        correlators.insert("0".to_string(), correlator.clone());
        let router = Arc::new(StubRouter { sink, correlators });
        let (_tx, control) = ControlChannel::new();
        let state = IngestState::new(DedupEngine::with_default_fingerprint(64), router, control);
        let ticket = correlator.register("0-abc");
        let app = build_router("/", state);
        let (body, hdrs) = submission_body("/a", Some("0-abc"));
        let mut req = axum::http::Request::builder().method("POST").uri("/");
        for (k, v) in &hdrs {
            req = req.header(k, v);
        }
        app.oneshot(req.body(axum::body::Body::from(body)).unwrap()).await.unwrap();
        let got = correlator.wait(ticket).await.unwrap();
        assert_eq!(got.scan_request_id, "0-abc");
    }
}
