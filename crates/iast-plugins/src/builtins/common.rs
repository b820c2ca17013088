//! Shared helpers for the built-in plugins: finding attackable params and
//! building the single-param-mutation batches most of them share.

use crate::plugin::{Batch, PlannedRequest};
use iast_builder::{param_affects_sink, BuilderResult, Mutation, RequestDraft};
use iast_model::{hash_stacks, Record, Sink};

/// Stack-hash for a single sink's call stack, for [`iast_model::VulnHook`].
pub fn single_stack_hash(sink: &Sink) -> String {
    sink.stack().map(|s| hash_stacks(std::iter::once(s))).unwrap_or_default()
}

/// A parameter name/value pair worth attacking, plus whether it was observed
/// on the query string (vs. form/post data) so the mutation targets the
/// right param-type.
pub struct Candidate {
    pub name: String,
    pub value: String,
    pub from_query: bool,
}

/// Enumerates every app-observed parameter whose current value is judged
/// (by the concatenation oracle) to affect at least one sink matching
/// `matches`.
pub fn candidates_for<'a>(record: &'a Record, matches: impl Fn(&Sink) -> bool + 'a) -> Vec<Candidate> {
    let sinks: Vec<&Sink> = record.sinks.iter().filter(|s| matches(s)).collect();
    if sinks.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (name, values) in &record.parameters {
        let from_query = record.query.contains_key(name);
        for value in values {
            if sinks.iter().any(|sink| param_affects_sink(value, sink)) {
                out.push(Candidate { name: name.clone(), value: value.clone(), from_query });
            }
        }
    }
    out
}

/// Builds a one-request batch that overwrites `candidate`'s parameter with
/// `payload`, tagging the planned request with `payload` as the feature the
/// Checker should look for.
pub fn single_mutation_batch(record: &Record, candidate: &Candidate, payload: &str) -> BuilderResult<Batch> {
    single_mutation_batch_with_feature(record, candidate, payload, payload)
}

/// As [`single_mutation_batch`], but `feature` is the string the Checker
/// should look for at the sink, which is not always the same as `payload`
/// itself (e.g. a traversal payload whose feature is the short resolved-path
/// suffix left behind after the traversal).
pub fn single_mutation_batch_with_feature(
    record: &Record,
    candidate: &Candidate,
    payload: &str,
    feature: &str,
) -> BuilderResult<Batch> {
    let mut draft = RequestDraft::from_record(record)?;
    let mutation = if candidate.from_query {
        Mutation::Get { name: candidate.name.clone(), value: payload.to_string() }
    } else {
        Mutation::Post { name: candidate.name.clone(), value: payload.to_string() }
    };
    draft.apply(mutation)?;
    Ok(vec![PlannedRequest { draft, feature: feature.to_string() }])
}
