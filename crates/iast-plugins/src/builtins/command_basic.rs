//! Injects shell metacharacter payloads into params observed to reach a
//! `command` sink.

use crate::builtins::common::{candidates_for, single_mutation_batch, single_stack_hash};
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, Plugin};
use iast_builder::feature_reached;
use iast_model::{Record, Sink, VulnHook};

const PAYLOADS: &[&str] = &["'\"openrasp' cmd", "a$(openrasp `cmd`)b", "openrasp=openxrasp"];

pub struct CommandBasic;

impl Plugin for CommandBasic {
    fn name(&self) -> &'static str {
        "command_basic"
    }

    fn description(&self) -> &'static str {
        "injects shell metacharacter payloads into parameters that reach a command sink"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        let candidates = candidates_for(record, |sink| matches!(sink, Sink::Command { .. }));
        let mut batches = Vec::new();
        for candidate in &candidates {
            for payload in PAYLOADS {
                if let Ok(batch) = single_mutation_batch(record, candidate, payload) {
                    batches.push(batch);
                }
            }
        }
        batches
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;

        for (index, sink) in record.sinks.iter().enumerate() {
            if matches!(sink, Sink::Command { .. }) && feature_reached(sink, &request.feature) {
                return Some(CheckOutcome::new(
                    format!("command injection: payload {:?} altered command lexing", request.feature),
                    vec![record.clone()],
                    Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
                ));
            }
        }
        None
    }
}
