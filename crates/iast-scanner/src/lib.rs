//! The Per-Target Scanner: replays plugin-proposed requests against one
//! target and correlates agent-observed records back into findings
//!.

#![forbid(unsafe_code)]

mod failure;
mod fetch;
mod rate_gate;
mod replay;
mod scanner;
mod whitelist;
mod worker;

pub use failure::FailureTracker;
pub use fetch::{adjust_fetch_count, clamp_fetch_count};
pub use rate_gate::RateGate;
pub use replay::{ReplayError, ReplaySender, ReqwestReplaySender};
pub use scanner::Scanner;
pub use whitelist::is_whitelisted;
pub use worker::PluginWorker;
