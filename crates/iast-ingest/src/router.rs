//! The boundary between the Ingest Server and the components that own
//! per-target storage and per-scanner correlation. Kept as traits, the same
//! way `iast_dedup::EndpointSink` decouples the Dedup Engine from the
//! Durable Queue, so the ingest crate does not depend on `iast-queue` or
//! `iast-target` directly.

use iast_correlator::Correlator;
use iast_dedup::EndpointSink;
use std::sync::Arc;

/// Resolves a `(host, port)` pair to the sink that persists its observed
/// records, creating target state (and triggering auto-start) on first
/// sight if the implementation chooses to.
pub trait TargetRouter: Send + Sync {
    fn endpoint_sink(&self, host: &str, port: u16) -> Arc<dyn EndpointSink>;

    /// Looks up the Correlator for a scan inbox id. `None` means no scanner
    /// is registered under that id — the replay record is dropped and
    /// counted.
    fn correlator(&self, inbox: &str) -> Option<Arc<Correlator>>;
}
