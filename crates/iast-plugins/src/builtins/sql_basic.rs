//! Injects a single-quote break-out payload into params observed to reach a
//! `sql` sink.

use crate::builtins::common::{candidates_for, single_mutation_batch, single_stack_hash};
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, Plugin};
use iast_builder::feature_reached;
use iast_model::{Record, Sink, VulnHook};

const PAYLOAD: &str = "1'openrasp";

pub struct SqlBasic;

impl Plugin for SqlBasic {
    fn name(&self) -> &'static str {
        "sql_basic"
    }

    fn description(&self) -> &'static str {
        "injects a quote-breakout payload into parameters that reach a sql sink"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        candidates_for(record, |sink| matches!(sink, Sink::Sql { .. }))
            .iter()
            .filter_map(|candidate| single_mutation_batch(record, candidate, PAYLOAD).ok())
            .collect()
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;

        for (index, sink) in record.sinks.iter().enumerate() {
            if matches!(sink, Sink::Sql { .. }) && feature_reached(sink, &request.feature) {
                return Some(CheckOutcome::new(
                    format!("sql injection: payload {:?} altered query lexing", request.feature),
                    vec![record.clone()],
                    Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
                ));
            }
        }
        None
    }
}
