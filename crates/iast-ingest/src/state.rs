use crate::control::ControlChannel;
use crate::router::TargetRouter;
use iast_dedup::DedupEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared state for the Ingest Server's worker tasks. One
/// instance is shared across however many cooperative tasks accept
/// connections on the bound listener.
pub struct IngestState {
    pub(crate) dedup: DedupEngine,
    pub(crate) router: Arc<dyn TargetRouter>,
    pub(crate) control: ControlChannel,
    invalid_count: AtomicU64,
    dropped_replay_count: AtomicU64,
}

impl IngestState {
    pub fn new(dedup: DedupEngine, router: Arc<dyn TargetRouter>, control: ControlChannel) -> Arc<Self> {
        Arc::new(Self {
            dedup,
            router,
            control,
            invalid_count: AtomicU64::new(0),
            dropped_replay_count: AtomicU64::new(0),
        })
    }

    pub(crate) fn count_invalid(&self) {
        self.invalid_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_dropped_replay(&self) {
        self.dropped_replay_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_count(&self) -> u64 {
        self.invalid_count.load(Ordering::Relaxed)
    }

    pub fn dropped_replay_count(&self) -> u64 {
        self.dropped_replay_count.load(Ordering::Relaxed)
    }
}
