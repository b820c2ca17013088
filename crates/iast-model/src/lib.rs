//! Record/Endpoint/Finding/TargetConfig data model for the IAST scanner.
//!
//! This is the parsed, typed form of an agent submission and the rows
//! derived from it. See spec §3 ("Data Model").

#![forbid(unsafe_code)]

mod endpoint;
mod error;
mod finding;
mod record;
mod sink;
mod target_config;

pub use endpoint::{Endpoint, ScanStatus};
pub use error::{ModelError, ModelResult};
pub use finding::{Finding, VulnHook};
pub use record::{
    sorted_keys, AgentContext, AgentSubmission, HeaderMap, MultiMap, Record, ServerDescriptor,
    UploadedFile,
};
pub use sink::{hash_stacks, Sink, SinkKind, Token};
pub use target_config::{
    normalize_host, report_table, result_list_table, RateBounds, TargetConfig,
    DEFAULT_CONFIG_KEY,
};
