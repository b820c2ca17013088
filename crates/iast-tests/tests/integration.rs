//! Cross-crate end-to-end scenarios that no single crate's own test module
//! exercises in full: the rate scheduler converging over many ticks, and
//! the Supervisor/Target Manager pair auto-starting a scanner from a live
//! observed record posted through the real Ingest Server router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use iast_config::Config;
use iast_model::{RateBounds, TargetConfig};
use iast_plugins::PluginRegistry;
use iast_rate::{Observation, RateScheduler, RateThresholds};
use iast_supervisor::Supervisor;
use iast_target::TargetManager;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn bounds() -> RateBounds {
    RateBounds { max_concurrent: 5, min_interval_ms: 50, max_interval_ms: 300 }
}

fn calm_tick(requests_sent: u64) -> Observation {
    Observation {
        cpu_percent: 10.0,
        requests_sent,
        correlated_timeouts: 0,
        failed_requests: 0,
        interval_elapsed_ms: 1000,
    }
}

#[test]
fn rate_scheduler_converges_to_max_concurrency_then_backs_off_under_sustained_failure() {
    let scheduler = RateScheduler::new(bounds(), RateThresholds::default());

    // Saturated, low-cpu ticks should walk the gate up toward max_concurrent
    // at min_interval_ms within a handful of ticks.
    let mut last = scheduler.current();
    for _ in 0..40 {
        last = scheduler.tick(Observation { requests_sent: 25, ..calm_tick(25) });
        if last.max_in_flight == bounds().max_concurrent && last.interval_ms == bounds().min_interval_ms {
            break;
        }
    }
    assert_eq!(last.max_in_flight, bounds().max_concurrent);
    assert_eq!(last.interval_ms, bounds().min_interval_ms);

    // Twenty consecutive failed ticks should drive concurrency back down to
    // the floor and push the interval back up from the minimum.
    let mut decision = last;
    for _ in 0..20 {
        decision = scheduler.tick(Observation { correlated_timeouts: 1, failed_requests: 1, ..calm_tick(1) });
    }
    assert_eq!(decision.max_in_flight, 1);
    assert!(decision.interval_ms > bounds().min_interval_ms);
}

fn submission_body(hostname: &str, port: u16, path: &str) -> String {
    format!(
        r#"{{"context":{{"requestId":"r1","json":null,"server":{{"language":"php","name":"apache","version":"1","os":"linux"}},"body":null,"method":"get","querystring":"id=1","path":"{path}","parameter":{{"id":["1"]}},"header":{{}},"nic":[],"hostname":"{hostname}","port":{port}}},"hook_info":[]}}"#
    )
}

#[tokio::test]
async fn observed_record_for_an_unregistered_target_auto_starts_a_scanner() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.preprocessor.api_path = "/".to_string();

    let plugins = PluginRegistry::new();
    let supervisor = Supervisor::new(dir.path().to_path_buf(), config.clone(), plugins);

    let (ingest_handle, control) = supervisor
        .serve_ingest(([127, 0, 0, 1], 0).into())
        .await
        .expect("ingest server binds");
    // Drop the bound listener's own task; we build a second, in-process
    // router below so the request can be driven via `oneshot` without a
    // real socket.
    ingest_handle.abort();

    let manager = Arc::new(TargetManager::new(dir.path(), supervisor.clone(), Some(control.clone()), 4, TargetConfig::default()));
    supervisor.attach_target_manager(&manager);
    manager.set_auto_start(true);

    let dedup = iast_dedup::DedupEngine::with_default_fingerprint(config.preprocessor.request_lru_size);
    let router: Arc<dyn iast_ingest::TargetRouter> = supervisor.clone();
    let (_control_tx, observed_control) = iast_ingest::ControlChannel::new();
    let state = iast_ingest::IngestState::new(dedup, router, observed_control);
    let app = iast_ingest::build_router("/", state);

    let body = submission_body("auto.example.com", 8080, "/login");
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Auto-start spawns its scanner task off the request path, so give the
    // runtime a moment to register it with the Target Manager.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let targets = manager.list_targets(1, 50);
    assert!(
        targets.iter().any(|t| t.host_port == "auto.example.com:8080"),
        "expected auto-started target to appear in the target list, got {targets:?}"
    );
}

#[test]
fn scanner_lifecycle_runs_through_the_real_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let plugins = PluginRegistry::new();
    let supervisor = Supervisor::new(dir.path().to_path_buf(), config, plugins);
    let manager = TargetManager::new(dir.path(), supervisor.clone(), None, 4, TargetConfig::default());

    let handle = manager.start_target("live.example.com", 443).unwrap();
    assert!(manager.start_target("live.example.com", 443).is_err(), "duplicate start must be rejected");

    manager.stop_target(handle.scanner_id).unwrap();
    assert!(manager.stop_target(handle.scanner_id).is_err(), "double stop must be rejected");
}
