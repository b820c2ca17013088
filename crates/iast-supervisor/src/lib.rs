//! Wires the Durable Queue, Correlator, Attack Plugins, Scanner, and Target
//! Manager into one runtime the ingest daemon can start.

#![forbid(unsafe_code)]

mod supervisor;

pub use supervisor::Supervisor;
