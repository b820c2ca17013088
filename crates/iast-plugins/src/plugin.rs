//! The Attack Plugin contract.

use iast_builder::RequestDraft;
use iast_model::Record;

/// One request this plugin wants sent, paired with the payload feature it
/// injected — the Checker needs the feature string to decide, after replay,
/// whether it reached the intended sink.
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub draft: RequestDraft,
    pub feature: String,
}

/// An ordered list of requests whose correlated records will be needed
/// together before `check` can decide.
pub type Batch = Vec<PlannedRequest>;

/// The outcome of sending one [`PlannedRequest`]: either the agent record
/// correlated back, or the replay/correlation failed and this slot is empty.
/// A batch with any empty slot is skipped by the scanner, not failed
///.
#[derive(Debug, Clone)]
pub struct CorrelatedRequest {
    pub feature: String,
    pub record: Option<Record>,
}

/// What a plugin's `check` is handed after a batch has been sent and its
/// replies correlated.
#[derive(Debug, Clone)]
pub struct CheckedBatch<'a> {
    /// The original endpoint Record the batch mutated, for context the
    /// checker needs (e.g. `app_base_path`).
    pub original: &'a Record,
    pub requests: Vec<CorrelatedRequest>,
}

/// A finding a plugin's `check` reports.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub message: String,
    pub records: Vec<Record>,
    pub vuln_hook: Option<iast_model::VulnHook>,
    /// `true` for findings that planted an artifact on the target (e.g. an
    /// uploaded webshell), mirroring `Finding::upload`.
    pub upload: bool,
}

impl CheckOutcome {
    /// Convenience constructor for the common (non-upload) case.
    pub fn new(message: impl Into<String>, records: Vec<Record>, vuln_hook: Option<iast_model::VulnHook>) -> Self {
        Self { message: message.into(), records, vuln_hook, upload: false }
    }
}

/// One independent attack module. Plugins are stateless
/// between batches except for their logger.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Produces the request batches this plugin wants to try against
    /// `record`. May return an empty vec if no sink/param combination in
    /// this record is relevant.
    fn mutate(&self, record: &Record) -> Vec<Batch>;

    /// Decides, from a sent-and-correlated batch, whether the target is
    /// vulnerable.
    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome>;
}
