//! The Sink Correlator.

#![forbid(unsafe_code)]

mod correlator;
mod error;

pub use correlator::{Correlator, Ticket};
pub use error::{CorrelationError, CorrelationResult};
