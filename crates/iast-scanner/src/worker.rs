//! One plugin's worker task: pulls claimed endpoints, sends the plugin's
//! request batches, correlates replies, and reports findings.

use crate::failure::FailureTracker;
use crate::rate_gate::RateGate;
use crate::replay::ReplaySender;
use chrono::Utc;
use iast_correlator::Correlator;
use iast_model::{Endpoint, Finding, Record};
use iast_plugins::{Batch, CheckOutcome, CheckedBatch, CorrelatedRequest, Plugin, PlannedRequest};
use iast_queue::ReportTable;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs one plugin against claimed endpoints, using the scanner's shared
/// services. Plugins are stateless between batches; all the
/// state here belongs to the scanner host, not the plugin.
pub struct PluginWorker {
    plugin: Arc<dyn Plugin>,
    inbox: String,
    correlator: Arc<Correlator>,
    sender: Arc<dyn ReplaySender>,
    gate: Arc<RateGate>,
    failures: Arc<FailureTracker>,
    reports: Arc<ReportTable>,
    sent_counter: Arc<AtomicU64>,
}

impl PluginWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plugin: Arc<dyn Plugin>,
        inbox: String,
        correlator: Arc<Correlator>,
        sender: Arc<dyn ReplaySender>,
        gate: Arc<RateGate>,
        failures: Arc<FailureTracker>,
        reports: Arc<ReportTable>,
        sent_counter: Arc<AtomicU64>,
    ) -> Self {
        Self { plugin, inbox, correlator, sender, gate, failures, reports, sent_counter }
    }

    /// Runs every batch this plugin proposes for `endpoint`, reporting any
    /// finding `check` surfaces.
    pub async fn process(&self, endpoint: &Endpoint) {
        for (batch_index, batch) in self.plugin.mutate(&endpoint.record).into_iter().enumerate() {
            if let Some(outcome) = self.run_batch(endpoint, batch).await {
                self.report(endpoint, batch_index, outcome);
            }
        }
    }

    async fn run_batch(&self, endpoint: &Endpoint, batch: Batch) -> Option<CheckOutcome> {
        let mut requests = Vec::with_capacity(batch.len());
        for planned in &batch {
            let record = self.send_with_retry(endpoint.id, planned).await;
            requests.push(CorrelatedRequest { feature: planned.feature.clone(), record });
        }

        // A batch with any empty slot is skipped, not failed.
        if requests.iter().any(|r| r.record.is_none()) {
            return None;
        }

        let checked = CheckedBatch { original: &endpoint.record, requests };
        self.plugin.check(&checked)
    }

    async fn send_with_retry(&self, id: u64, planned: &PlannedRequest) -> Option<Record> {
        loop {
            let mut draft = planned.draft.clone();
            let scan_request_id = draft.assign_scan_request_id(&self.inbox);

            self.gate.acquire().await;
            let ticket = self.correlator.register(scan_request_id);
            let sent = self.sender.send(&draft).await;
            self.sent_counter.fetch_add(1, Ordering::Relaxed);
            self.gate.release().await;

            if sent.is_err() {
                if self.failures.record_failure(id) {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                return None;
            }

            match self.correlator.wait(ticket).await {
                Ok(record) => {
                    self.failures.record_success(id);
                    return Some(record);
                }
                Err(_) => {
                    if self.failures.record_failure(id) {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    fn report(&self, endpoint: &Endpoint, batch_index: usize, outcome: CheckOutcome) {
        let finding = Finding {
            plugin_name: self.plugin.name().to_string(),
            description: self.plugin.description().to_string(),
            records: outcome.records,
            vuln_hook: outcome.vuln_hook,
            payload_sequence_id: format!("{}:{batch_index}", endpoint.id),
            message: outcome.message,
            timestamp: Utc::now(),
            upload: outcome.upload,
        };
        self.reports.report(finding);
    }
}
