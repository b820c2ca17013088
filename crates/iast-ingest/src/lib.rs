//! The Ingest Server: accepts agent submissions over HTTP,
//! classifies each as scan or observed, and routes accordingly without
//! blocking the agent.

#![forbid(unsafe_code)]

mod control;
mod router;
mod server;
mod state;

pub use control::{ControlChannel, ControlDirective, ControlSender};
pub use router::TargetRouter;
pub use server::build_router;
pub use state::IngestState;
