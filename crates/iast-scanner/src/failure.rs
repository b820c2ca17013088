//! Per-scanner failed-set bookkeeping.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Tracks retry attempts per durable id and the set of ids that have
/// exhausted their retry budget. Drained into `settle`'s `failed_ids`
/// argument once a batch of claimed work has finished.
pub struct FailureTracker {
    retry_budget: u32,
    attempts: Mutex<HashMap<u64, u32>>,
    failed: Mutex<HashSet<u64>>,
}

impl FailureTracker {
    pub fn new(retry_budget: u32) -> Self {
        Self { retry_budget, attempts: Mutex::new(HashMap::new()), failed: Mutex::new(HashSet::new()) }
    }

    /// Records one failed replay attempt for `id`. Returns `true` if the
    /// caller should retry (budget not yet exhausted), `false` once `id` has
    /// been added to the failed set and the plugin batch should be
    /// abandoned.
    pub fn record_failure(&self, id: u64) -> bool {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(id).or_insert(0);
        *count += 1;
        if *count > self.retry_budget {
            attempts.remove(&id);
            self.failed.lock().insert(id);
            false
        } else {
            true
        }
    }

    /// Clears a successful id's attempt counter so a later unrelated replay
    /// of the same id starts with a fresh budget.
    pub fn record_success(&self, id: u64) {
        self.attempts.lock().remove(&id);
    }

    /// Drains the failed set for the caller's upcoming `settle` call.
    pub fn drain_failed(&self) -> Vec<u64> {
        self.failed.lock().drain().collect()
    }

    /// Current failed-set size, without draining it. Fed to the Rate
    /// Scheduler as a failure signal.
    pub fn failed_len(&self) -> usize {
        self.failed.lock().len()
    }
}
