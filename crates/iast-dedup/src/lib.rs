//! Per-target fingerprint dedup for observed traffic.

#![forbid(unsafe_code)]

mod engine;
mod fingerprint;

pub use engine::{DedupEngine, DedupOutcome, EndpointSink};
pub use fingerprint::{default_fingerprint, json_skeleton, FingerprintFn};
