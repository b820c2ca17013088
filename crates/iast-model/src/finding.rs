//! Report table row and the vuln-hook marker.

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The marker the Checker attaches when it decides a vulnerability exists:
/// the selected sink's index within the correlated Record plus that sink's
/// stack-hash. Kept out of `Record` itself — per REDESIGN FLAGS §9, the
/// Record stays immutable and this travels alongside it instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnHook {
    pub sink_index: usize,
    pub stack_hash: String,
}

/// A row in the per-target Report table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub plugin_name: String,
    pub description: String,
    /// The mutated request plus its correlated agent record, for every
    /// request in the batch that proved the vulnerability.
    pub records: Vec<Record>,
    pub vuln_hook: Option<VulnHook>,
    /// Unique per finding; identical sequence ids across retries deduplicate
    /// findings.
    pub payload_sequence_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub upload: bool,
}
