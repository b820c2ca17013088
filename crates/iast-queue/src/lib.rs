//! Durable Queue, Report table, and Target Configuration table
//!.

#![forbid(unsafe_code)]

mod config_store;
mod error;
mod queue;
mod report;

pub use config_store::{ConfigTable, GlobalFlags, ALL_KEY};
pub use error::{QueueError, QueueResult};
pub use queue::DurableQueue;
pub use report::ReportTable;
