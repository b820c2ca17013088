//! Injects a path-traversal include payload into params observed to reach an
//! `include` sink.

use crate::builtins::common::{candidates_for, single_mutation_batch, single_stack_hash};
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, Plugin};
use iast_builder::feature_reached;
use iast_model::{Record, Sink, VulnHook};

const PAYLOAD: &str = "../../../../../../../../etc/passwd";

pub struct IncludeBasic;

impl Plugin for IncludeBasic {
    fn name(&self) -> &'static str {
        "include_basic"
    }

    fn description(&self) -> &'static str {
        "injects a path-traversal payload into parameters that reach an include sink"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        candidates_for(record, |sink| matches!(sink, Sink::Include { .. }))
            .iter()
            .filter_map(|candidate| single_mutation_batch(record, candidate, PAYLOAD).ok())
            .collect()
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;

        for (index, sink) in record.sinks.iter().enumerate() {
            if matches!(sink, Sink::Include { .. }) && feature_reached(sink, &request.feature) {
                return Some(CheckOutcome::new(
                    format!("remote/local file include: payload {:?} reached an include sink", request.feature),
                    vec![record.clone()],
                    Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
                ));
            }
        }
        None
    }
}
