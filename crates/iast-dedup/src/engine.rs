//! Per-target bounded LRU of request fingerprints.

use crate::fingerprint::FingerprintFn;
use iast_model::Record;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tracing::debug;

/// What the Durable Queue must offer the Dedup Engine: a way to persist a
/// newly-seen fingerprint. Kept as a trait (rather than a direct dependency
/// on `iast-queue`) so the two stay decoupled as independently owned
/// components.
pub trait EndpointSink {
    /// Persists `record` under `fingerprint`. Returns `Ok(true)` if this was
    /// a new row, `Ok(false)` if the fingerprint already existed (a race the
    /// provisional-insert step below is meant to make rare, not impossible),
    /// `Err` on a storage-fatal failure.
    fn put(&self, target: &str, record: &Record, fingerprint: &str) -> Result<bool, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// New fingerprint, persisted.
    Inserted,
    /// Fingerprint already present in the target's LRU or the queue.
    Duplicate,
    /// The fingerprint function returned `None` (whitelist behavior).
    Dropped,
}

pub struct DedupEngine {
    fingerprint_fn: FingerprintFn,
    buckets: Mutex<HashMap<String, LruCache<String, ()>>>,
    capacity: NonZeroUsize,
}

impl DedupEngine {
    pub fn new(capacity: usize, fingerprint_fn: FingerprintFn) -> Self {
        Self {
            fingerprint_fn,
            buckets: Mutex::new(HashMap::new()),
            capacity: NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1"),
        }
    }

    pub fn with_default_fingerprint(capacity: usize) -> Self {
        Self::new(capacity, crate::fingerprint::default_fingerprint)
    }

    /// Checks a record against the target's LRU and, if new, provisionally
    /// inserts before asking the sink to persist — this closes the race
    /// where a concurrent duplicate could slip past the LRU while the first
    /// copy is still being written.
    pub fn check_and_insert(
        &self,
        target: &str,
        record: &Record,
        sink: &impl EndpointSink,
    ) -> DedupOutcome {
        let Some(fingerprint) = (self.fingerprint_fn)(record) else {
            return DedupOutcome::Dropped;
        };

        {
            let mut buckets = self.buckets.lock();
            let bucket = buckets
                .entry(target.to_string())
                .or_insert_with(|| LruCache::new(self.capacity));
            if bucket.contains(&fingerprint) {
                bucket.get(&fingerprint);
                debug!(target, fingerprint = %fingerprint, "duplicate fingerprint");
                return DedupOutcome::Duplicate;
            }
            bucket.put(fingerprint.clone(), ());
        }

        match sink.put(target, record, &fingerprint) {
            Ok(true) => DedupOutcome::Inserted,
            Ok(false) => DedupOutcome::Duplicate,
            Err(_) => {
                // Roll back the provisional insert so a later retry is not
                // silently swallowed as a duplicate.
                let mut buckets = self.buckets.lock();
                if let Some(bucket) = buckets.get_mut(target) {
                    bucket.pop(&fingerprint);
                }
                DedupOutcome::Dropped
            }
        }
    }

    /// Applies a "clear LRU" directive for a target.
    pub fn clear(&self, target: &str) {
        self.buckets.lock().remove(target);
    }

    pub fn len(&self, target: &str) -> usize {
        self.buckets.lock().get(target).map(LruCache::len).unwrap_or(0)
    }

    pub fn is_empty(&self, target: &str) -> bool {
        self.len(target) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
        fail_once: std::sync::atomic::AtomicBool,
    }

    impl EndpointSink for CountingSink {
        fn put(&self, _target: &str, _record: &Record, _fp: &str) -> Result<bool, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_once
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err("storage fatal".into());
            }
            Ok(true)
        }
    }

    fn record(path: &str) -> Record {
        Record {
            request_id: "r".into(),
            scan_request_id: String::new(),
            host: "x.com".into(),
            port: 80,
            method: "get".into(),
            path: path.into(),
            raw_query: String::new(),
            query: Default::default(),
            headers: Default::default(),
            cookie: String::new(),
            json_body: None,
            raw_body: Vec::new(),
            content_type: String::new(),
            content_length: 0,
            parameters: Default::default(),
            files: Vec::new(),
            server: Default::default(),
            server_hostname: "h".into(),
            server_nic: Vec::new(),
            app_base_path: "/var/www".into(),
            sinks: Vec::new(),
        }
    }

    #[test]
    fn duplicate_within_lru_is_dropped() {
        let engine = DedupEngine::with_default_fingerprint(8);
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_once: std::sync::atomic::AtomicBool::new(false),
        };
        let r = record("/a");
        assert_eq!(engine.check_and_insert("x.com:80", &r, &sink), DedupOutcome::Inserted);
        assert_eq!(engine.check_and_insert("x.com:80", &r, &sink), DedupOutcome::Duplicate);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn persist_failure_rolls_back_provisional_insert() {
        let engine = DedupEngine::with_default_fingerprint(8);
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_once: std::sync::atomic::AtomicBool::new(true),
        };
        let r = record("/a");
        assert_eq!(engine.check_and_insert("x.com:80", &r, &sink), DedupOutcome::Dropped);
        assert!(engine.is_empty("x.com:80"));
    }

    #[test]
    fn different_targets_have_independent_buckets() {
        let engine = DedupEngine::with_default_fingerprint(8);
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_once: std::sync::atomic::AtomicBool::new(false),
        };
        let r = record("/a");
        assert_eq!(engine.check_and_insert("x.com:80", &r, &sink), DedupOutcome::Inserted);
        assert_eq!(engine.check_and_insert("y.com:80", &r, &sink), DedupOutcome::Inserted);
    }

    #[test]
    fn clear_directive_empties_bucket() {
        let engine = DedupEngine::with_default_fingerprint(8);
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
            fail_once: std::sync::atomic::AtomicBool::new(false),
        };
        let r = record("/a");
        engine.check_and_insert("x.com:80", &r, &sink);
        engine.clear("x.com:80");
        assert!(engine.is_empty("x.com:80"));
    }
}
