//! The Per-Target Scanner's lifecycle and intake loop.

use crate::failure::FailureTracker;
use crate::fetch::{adjust_fetch_count, clamp_fetch_count};
use crate::rate_gate::RateGate;
use crate::replay::ReplaySender;
use crate::whitelist::is_whitelisted;
use crate::worker::PluginWorker;
use iast_correlator::Correlator;
use iast_plugins::Plugin;
use iast_queue::{DurableQueue, ReportTable};
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const INITIAL_FETCH_COUNT: u32 = 20;

/// One active (host, port) scanner. Owns the Durable Queue, Report table,
/// Correlator, and one worker task per enabled plugin.
pub struct Scanner {
    queue: Arc<DurableQueue>,
    reports: Arc<ReportTable>,
    correlator: Arc<Correlator>,
    plugins: Vec<Arc<dyn Plugin>>,
    sender: Arc<dyn ReplaySender>,
    gate: Arc<RateGate>,
    failures: Arc<FailureTracker>,
    inbox: String,
    whitelist: Option<Regex>,
    poll_interval: Duration,
    skipped_count: AtomicU64,
    sent_counter: Arc<AtomicU64>,
}

impl Scanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inbox: String,
        queue: Arc<DurableQueue>,
        reports: Arc<ReportTable>,
        correlator: Arc<Correlator>,
        plugins: Vec<Arc<dyn Plugin>>,
        sender: Arc<dyn ReplaySender>,
        gate: Arc<RateGate>,
        retry_budget: u32,
        whitelist: Option<Regex>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            reports,
            correlator,
            plugins,
            sender,
            gate,
            failures: Arc::new(FailureTracker::new(retry_budget)),
            inbox,
            whitelist,
            poll_interval,
            skipped_count: AtomicU64::new(0),
            sent_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped_count.load(Ordering::Relaxed)
    }

    /// Cumulative count of replay-send attempts (including retries), fed to
    /// the Rate Scheduler as a throughput signal.
    pub fn sent_count(&self) -> u64 {
        self.sent_counter.load(Ordering::Relaxed)
    }

    /// The scanner's failed-id tracker, shared with the caller so the Rate
    /// Scheduler can read a live failure signal.
    pub fn failures(&self) -> Arc<FailureTracker> {
        self.failures.clone()
    }

    /// Runs the intake loop until `cancel` is set and the backlog drains
    ///.
    pub async fn run(&self, cancel: Arc<AtomicBool>) {
        self.queue.reset_in_progress();

        let remaining = Arc::new(AtomicU64::new(0));
        let mut senders = Vec::with_capacity(self.plugins.len());
        let mut worker_handles = Vec::with_capacity(self.plugins.len());

        for plugin in &self.plugins {
            let (tx, rx) = mpsc::channel(64);
            senders.push(tx);
            let worker = PluginWorker::new(
                plugin.clone(),
                self.inbox.clone(),
                self.correlator.clone(),
                self.sender.clone(),
                self.gate.clone(),
                self.failures.clone(),
                self.reports.clone(),
                self.sent_counter.clone(),
            );
            let remaining = remaining.clone();
            worker_handles.push(tokio::spawn(run_worker_loop(worker, rx, remaining)));
        }

        let mut fetch_count = INITIAL_FETCH_COUNT;
        loop {
            if remaining.load(Ordering::SeqCst) == 0 && cancel.load(Ordering::SeqCst) {
                debug!("scanner cancelled and drained, exiting intake loop");
                break;
            }

            let claim_size = clamp_fetch_count(fetch_count, remaining.load(Ordering::SeqCst) as u32);
            let claimed = self.queue.claim(claim_size as usize);
            if claimed.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let mark_id = claimed.iter().map(|e| e.id).max().unwrap_or(0);
            for endpoint in claimed {
                let path_and_query = endpoint.record.combined_url_with_query();
                if is_whitelisted(self.whitelist.as_ref(), &path_and_query) {
                    self.skipped_count.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                remaining.fetch_add(senders.len() as u64, Ordering::SeqCst);
                for tx in &senders {
                    if tx.send(endpoint.clone()).await.is_err() {
                        remaining.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }

            let mut polls = 0u32;
            while remaining.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(self.poll_interval).await;
                polls += 1;
            }
            fetch_count = adjust_fetch_count(fetch_count, polls);

            let failed_ids = self.failures.drain_failed();
            self.queue.settle(mark_id, &failed_ids);
        }

        drop(senders);
        for handle in worker_handles {
            let _ = handle.await;
        }
        info!(inbox = %self.inbox, "scanner intake loop exited");
    }
}

async fn run_worker_loop(
    worker: PluginWorker,
    mut rx: mpsc::Receiver<iast_model::Endpoint>,
    remaining: Arc<AtomicU64>,
) {
    while let Some(endpoint) = rx.recv().await {
        worker.process(&endpoint).await;
        remaining.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayError;
    use async_trait::async_trait;
    use iast_builder::RequestDraft;
    use iast_model::{HeaderMap, MultiMap, Record, ServerDescriptor};
    use iast_plugins::{Batch, CheckOutcome, CheckedBatch};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct NullSender;
    #[async_trait]
    impl ReplaySender for NullSender {
        async fn send(&self, _draft: &RequestDraft) -> Result<(), ReplayError> {
            Err(ReplayError::Transport("no target in this test".into()))
        }
    }

    struct CountingPlugin {
        calls: AtomicUsize,
    }
    impl Plugin for CountingPlugin {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn description(&self) -> &'static str {
            "counts mutate calls"
        }
        fn mutate(&self, _record: &Record) -> Vec<Batch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
        fn check(&self, _batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
            None
        }
    }

    fn record(path: &str) -> Record {
        Record {
            request_id: "r".into(),
            scan_request_id: String::new(),
            host: "x.com".into(),
            port: 80,
            method: "get".into(),
            path: path.into(),
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

    #[tokio::test]
    async fn whitelisted_endpoints_are_skipped_without_reaching_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(DurableQueue::open(dir.path(), "x.com", 80));
        queue.put(&record("/admin/health"), "fp1");
        let reports = Arc::new(ReportTable::open(dir.path(), "x.com", 80));
        let correlator = Arc::new(Correlator::new(Duration::from_millis(50), 0));
        let plugin = Arc::new(CountingPlugin { calls: AtomicUsize::new(0) });
        let gate = Arc::new(RateGate::new(1, 0));
        let scanner = Scanner::new(
            "0".to_string(),
            queue.clone(),
            reports,
            correlator,
            vec![plugin.clone()],
            Arc::new(NullSender),
            gate,
            0,
            Some(Regex::new("^/admin/").unwrap()),
            Duration::from_millis(5),
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let scanner_task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                scanner.run(cancel).await;
                scanner
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.store(true, Ordering::SeqCst);
        let scanner = scanner_task.await.unwrap();

        assert_eq!(scanner.skipped_count(), 1);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 0);
    }
}
