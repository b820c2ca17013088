//! The Supervisor: spawns the Ingest Server and owns the
//! per-target scanner runtimes the Target Manager starts and stops.
//!
//! The original "fork-server" (a long-lived helper process performing all
//! subsequent process creations) has no literal `fork()` analogue in this
//! workspace; it is realized as a set of `tokio::task`s the Supervisor
//! spawns and cancels directly.

use iast_config::Config as AppConfig;
use iast_correlator::Correlator;
use iast_dedup::{DedupEngine, EndpointSink};
use iast_ingest::{build_router, ControlChannel, ControlSender, IngestState, TargetRouter};
use iast_model::TargetConfig;
use iast_plugins::{Plugin, PluginRegistry};
use iast_queue::{DurableQueue, ReportTable};
use iast_rate::{CpuReader, Observation, RateScheduler, RateThresholds, SysinfoCpuReader};
use iast_scanner::{RateGate, ReplaySender, ReqwestReplaySender, Scanner};
use iast_target::{ScannerHandle, ScannerSpawner, TargetError, TargetManager};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

fn host_port(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

struct RunningScanner {
    correlator: Arc<Correlator>,
    cancel: Arc<AtomicBool>,
    scan_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
}

struct Shared {
    queues: HashMap<String, Arc<DurableQueue>>,
    reports: HashMap<String, Arc<ReportTable>>,
    runtimes: HashMap<String, RunningScanner>,
    inbox_to_host_port: HashMap<String, String>,
}

/// Owns every running scanner task and the shared per-target stores; doubles
/// as the Ingest Server's [`TargetRouter`] and the Target Manager's
/// [`ScannerSpawner`].
pub struct Supervisor {
    state_path: PathBuf,
    config: AppConfig,
    plugins: Arc<PluginRegistry>,
    shared: Mutex<Shared>,
    target_manager: Mutex<Option<Weak<TargetManager>>>,
}

impl Supervisor {
    pub fn new(state_path: PathBuf, config: AppConfig, plugins: PluginRegistry) -> Arc<Self> {
        Arc::new(Self {
            state_path,
            config,
            plugins: Arc::new(plugins),
            shared: Mutex::new(Shared {
                queues: HashMap::new(),
                reports: HashMap::new(),
                runtimes: HashMap::new(),
                inbox_to_host_port: HashMap::new(),
            }),
            target_manager: Mutex::new(None),
        })
    }

    /// Wires the Target Manager back in, so observed traffic for an unknown
    /// target can auto-start a scanner.
    /// `TargetManager` owns this Supervisor as its spawner, so the back
    /// reference is a `Weak` to avoid a reference cycle.
    pub fn attach_target_manager(&self, manager: &Arc<TargetManager>) {
        *self.target_manager.lock() = Some(Arc::downgrade(manager));
    }

    fn queue_for(&self, host: &str, port: u16) -> Arc<DurableQueue> {
        let key = host_port(host, port);
        let mut shared = self.shared.lock();
        shared
            .queues
            .entry(key)
            .or_insert_with(|| Arc::new(DurableQueue::open(&self.state_path, host, port)))
            .clone()
    }

    fn reports_for(&self, host: &str, port: u16) -> Arc<ReportTable> {
        let key = host_port(host, port);
        let mut shared = self.shared.lock();
        shared
            .reports
            .entry(key)
            .or_insert_with(|| Arc::new(ReportTable::open(&self.state_path, host, port)))
            .clone()
    }

    fn maybe_auto_start(&self, host: &str, port: u16) {
        let key = host_port(host, port);
        if self.shared.lock().runtimes.contains_key(&key) {
            return;
        }
        let Some(manager) = self.target_manager.lock().as_ref().and_then(Weak::upgrade) else {
            return;
        };
        if !manager.get_auto_start() {
            return;
        }
        match manager.start_target(host, port) {
            Ok(_) | Err(TargetError::TargetAlreadyRunning(_)) => {}
            Err(e) => warn!(host, port, error = %e, "auto-start failed"),
        }
    }

    /// Spawns the Ingest Server's HTTP listener.
    pub async fn serve_ingest(
        self: &Arc<Self>,
        addr: SocketAddr,
    ) -> std::io::Result<(JoinHandle<()>, ControlSender)> {
        let (control_tx, control) = ControlChannel::new();
        let dedup = DedupEngine::with_default_fingerprint(self.config.preprocessor.request_lru_size);
        let router: Arc<dyn TargetRouter> = self.clone();
        let state = IngestState::new(dedup, router, control);
        let app = build_router(&self.config.preprocessor.api_path, state);

        let listener = TcpListener::bind(addr).await?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "ingest server exited");
            }
        });
        Ok((handle, control_tx))
    }
}

impl TargetRouter for Supervisor {
    fn endpoint_sink(&self, host: &str, port: u16) -> Arc<dyn EndpointSink> {
        self.maybe_auto_start(host, port);
        self.queue_for(host, port)
    }

    fn correlator(&self, inbox: &str) -> Option<Arc<Correlator>> {
        let shared = self.shared.lock();
        let key = shared.inbox_to_host_port.get(inbox)?;
        shared.runtimes.get(key).map(|r| r.correlator.clone())
    }
}

impl ScannerSpawner for Supervisor {
    fn spawn(&self, scanner_id: u64, host: &str, port: u16, config: &TargetConfig) -> Option<u32> {
        let key = host_port(host, port);
        let queue = self.queue_for(host, port);
        let reports = self.reports_for(host, port);
        let scanner_cfg = self.config.scanner.clone();

        let correlator = Arc::new(Correlator::new(
            Duration::from_secs(scanner_cfg.request_timeout),
            scanner_cfg.retry_times,
        ));

        let plugins: Vec<Arc<dyn Plugin>> = self
            .plugins
            .all()
            .filter(|p| *config.enabled_plugins.get(p.name()).unwrap_or(&true))
            .cloned()
            .collect();

        let gate = Arc::new(RateGate::new(1, config.rate_bounds.min_interval_ms));
        let sender: Arc<dyn ReplaySender> = Arc::new(ReqwestReplaySender::with_proxy(
            Duration::from_secs(scanner_cfg.request_timeout),
            config.upstream_proxy.as_deref(),
        ));
        let whitelist = if config.skip_url_regex.is_empty() {
            None
        } else {
            match regex::Regex::new(&config.skip_url_regex) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(host, port, error = %e, "ignoring malformed skip url regex");
                    None
                }
            }
        };

        let inbox = scanner_id.to_string();
        let scanner = Arc::new(Scanner::new(
            inbox.clone(),
            queue,
            reports,
            correlator.clone(),
            plugins,
            sender,
            gate.clone(),
            scanner_cfg.retry_times,
            whitelist,
            Duration::from_millis(200),
        ));

        let cancel = Arc::new(AtomicBool::new(false));
        let scan_task = {
            let scanner = scanner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                scanner.run(cancel).await;
            })
        };

        let monitor_task = {
            let scheduler = RateScheduler::new(
                config.rate_bounds.clone(),
                RateThresholds { cpu_high: self.config.monitor.max_cpu, cpu_low: self.config.monitor.min_cpu },
            );
            let cpu_reader = SysinfoCpuReader::new();
            let interval = Duration::from_secs(self.config.monitor.schedule_interval.max(1));
            let scanner = scanner.clone();
            let gate = gate.clone();
            let correlator = correlator.clone();
            let cancel = cancel.clone();
            let failures = scanner.failures();
            tokio::spawn(async move {
                let mut prev_sent = 0u64;
                loop {
                    tokio::time::sleep(interval).await;
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let sent_now = scanner.sent_count();
                    let obs = Observation {
                        cpu_percent: cpu_reader.read_cpu_percent(),
                        requests_sent: sent_now.saturating_sub(prev_sent),
                        correlated_timeouts: correlator.expired_count(),
                        failed_requests: failures.failed_len() as u64,
                        interval_elapsed_ms: interval.as_millis() as u64,
                    };
                    prev_sent = sent_now;
                    let decision = scheduler.tick(obs);
                    gate.apply_decision(&decision);
                }
            })
        };

        let mut shared = self.shared.lock();
        shared.inbox_to_host_port.insert(inbox, key.clone());
        shared.runtimes.insert(key, RunningScanner { correlator, cancel, scan_task, monitor_task });
        info!(host, port, scanner_id, "scanner runtime started");
        None
    }

    fn is_alive(&self, handle: &ScannerHandle) -> bool {
        let key = host_port(&handle.host, handle.port);
        self.shared.lock().runtimes.get(&key).map(|r| !r.scan_task.is_finished()).unwrap_or(false)
    }

    fn stop(&self, handle: &ScannerHandle) {
        let key = host_port(&handle.host, handle.port);
        let Some(running) = self.shared.lock().runtimes.remove(&key) else {
            return;
        };
        running.cancel.store(true, Ordering::SeqCst);
        running.monitor_task.abort();
        tokio::spawn(async move {
            let mut scan_task = running.scan_task;
            tokio::select! {
                _ = &mut scan_task => {}
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    scan_task.abort();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iast_model::RateBounds;

    fn test_config() -> AppConfig {
        AppConfig::default()
    }

    #[tokio::test]
    async fn spawn_registers_a_runtime_reachable_by_inbox() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(dir.path().to_path_buf(), test_config(), iast_plugins::builtin_registry());

        let cfg = TargetConfig {
            host_port: "x.com:80".into(),
            rate_bounds: RateBounds { max_concurrent: 1, min_interval_ms: 0, max_interval_ms: 10 },
            ..Default::default()
        };
        supervisor.spawn(7, "x.com", 80, &cfg);

        let handle = ScannerHandle { scanner_id: 7, host: "x.com".into(), port: 80, pid: None };
        assert!(supervisor.is_alive(&handle));
        assert!(TargetRouter::correlator(&*supervisor, "7").is_some());

        supervisor.stop(&handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!supervisor.is_alive(&handle));
    }

    #[test]
    fn endpoint_sink_opens_a_queue_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(dir.path().to_path_buf(), test_config(), iast_plugins::builtin_registry());
        let sink = TargetRouter::endpoint_sink(&*supervisor, "y.com", 443);
        assert!(sink.put("y.com:443", &test_record(), "fp1").unwrap());
    }

    fn test_record() -> iast_model::Record {
        use iast_model::{HeaderMap, MultiMap, ServerDescriptor};
        iast_model::Record {
            request_id: "r".into(),
            scan_request_id: String::new(),
            host: "y.com".into(),
            port: 443,
            method: "get".into(),
            path: "/".into(),
            raw_query: String::new(),
            query: MultiMap::new(),
            headers: HeaderMap::new(),
            cookie: String::new(),
            json_body: None,
            raw_body: Vec::new(),
            content_type: String::new(),
            content_length: 0,
            parameters: MultiMap::new(),
            files: Vec::new(),
            server: ServerDescriptor::default(),
            server_hostname: "h".into(),
            server_nic: Vec::new(),
            app_base_path: "/var/www".into(),
            sinks: Vec::new(),
        }
    }
}
