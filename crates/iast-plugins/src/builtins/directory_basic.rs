//! Directory-traversal payloads selected by the target application's
//! observed OS, injected into params that reach a `directory` sink.

use crate::builtins::common::{candidates_for, single_mutation_batch_with_feature, single_stack_hash};
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, Plugin};
use iast_builder::feature_reached;
use iast_model::{Record, Sink, VulnHook};

const DEEP_TRAVERSAL: &str = "../../../../../../../../../../../../../../../../../../../../";
const SHALLOW_TRAVERSAL: &str = "../../../../";
const WINDOWS_TRAVERSAL: &str = "..\\..\\..\\..\\..\\..\\..\\..\\..\\";

/// `(payload, feature)` pairs for the observed OS: `payload` is the value
/// injected into the parameter, `feature` is the short resolved-path suffix
/// the Checker looks for at the sink once the traversal has been resolved.
fn payloads_for_os(os: &str) -> Vec<(String, &'static str)> {
    let os = os.to_ascii_lowercase();
    if os.contains("win") {
        vec![
            (format!("{WINDOWS_TRAVERSAL}c:\\openrasp_dir"), ":/openrasp_dir"),
            ("file://c:\\openrasp_dir".to_string(), "c:\\openrasp_dir"),
        ]
    } else if os.contains("mac") || os.contains("darwin") {
        vec![
            (format!("{DEEP_TRAVERSAL}private/etc"), "/private/etc"),
            (format!("{SHALLOW_TRAVERSAL}private/etc"), "/private/etc"),
            ("/private/etc".to_string(), "/private/etc"),
        ]
    } else {
        vec![
            (format!("{DEEP_TRAVERSAL}etc"), "/etc"),
            (format!("{SHALLOW_TRAVERSAL}etc"), "/etc"),
            ("/etc".to_string(), "/etc"),
        ]
    }
}

pub struct DirectoryBasic;

impl Plugin for DirectoryBasic {
    fn name(&self) -> &'static str {
        "directory_basic"
    }

    fn description(&self) -> &'static str {
        "injects an OS-selected directory traversal payload into parameters that reach a directory sink"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        let payloads = payloads_for_os(&record.server.os);
        let candidates = candidates_for(record, |sink| matches!(sink, Sink::Directory { .. }));
        candidates
            .iter()
            .flat_map(|candidate| {
                payloads
                    .iter()
                    .filter_map(|(payload, feature)| single_mutation_batch_with_feature(record, candidate, payload, feature).ok())
            })
            .collect()
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;

        for (index, sink) in record.sinks.iter().enumerate() {
            if matches!(sink, Sink::Directory { .. }) && feature_reached(sink, &request.feature) {
                return Some(CheckOutcome::new(
                    format!("directory traversal: payload {:?} reached a directory sink", request.feature),
                    vec![record.clone()],
                    Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
                ));
            }
        }
        None
    }
}
