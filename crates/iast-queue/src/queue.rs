//! The per-target Durable Queue.

use crate::error::QueueResult;
use iast_dedup::EndpointSink;
use iast_model::{result_list_table, Endpoint, Record, ScanStatus};
use iast_persist::JsonStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound::{Excluded, Included};
use std::path::Path;
use tracing::warn;

struct QueueInner {
    rows: BTreeMap<u64, Endpoint>,
    fingerprints: HashSet<String>,
    next_id: u64,
    start_id: u64,
}

/// Per-target ordered table of endpoint records.
pub struct DurableQueue {
    inner: Mutex<QueueInner>,
    store: JsonStore,
}

impl DurableQueue {
    pub fn open(state_path: &Path, host: &str, port: u16) -> Self {
        let store = JsonStore::new(state_path, &result_list_table(host, port));
        let loaded: std::collections::HashMap<String, Endpoint> = store.load();
        let mut rows = BTreeMap::new();
        let mut fingerprints = HashSet::new();
        let mut next_id = 1;
        for (_, endpoint) in loaded {
            next_id = next_id.max(endpoint.id + 1);
            fingerprints.insert(endpoint.fingerprint.clone());
            rows.insert(endpoint.id, endpoint);
        }
        Self {
            inner: Mutex::new(QueueInner {
                rows,
                fingerprints,
                next_id,
                start_id: 0,
            }),
            store,
        }
    }

    fn snapshot(&self, inner: &QueueInner) {
        let map: std::collections::HashMap<String, Endpoint> = inner
            .rows
            .iter()
            .map(|(id, ep)| (id.to_string(), ep.clone()))
            .collect();
        if let Err(e) = self.store.save(&map) {
            warn!(error = %e, "failed to snapshot durable queue");
        }
    }

    /// Inserts `record` with status `new`. Returns `false` (and drops the
    /// record) if its fingerprint already exists for this target.
    pub fn put(&self, record: &Record, fingerprint: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.fingerprints.contains(fingerprint) {
            return false;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.fingerprints.insert(fingerprint.to_string());
        inner.rows.insert(
            id,
            Endpoint {
                id,
                record: record.clone(),
                fingerprint: fingerprint.to_string(),
                scan_status: ScanStatus::New,
                created_at: chrono::Utc::now(),
            },
        );
        self.snapshot(&inner);
        true
    }

    /// Promotes the next `n` `new` items (id ascending) to `in-progress` and
    /// returns them, atomically under the queue's lock so no two callers
    /// claim the same row.
    pub fn claim(&self, n: usize) -> Vec<Endpoint> {
        let mut inner = self.inner.lock();
        let ids: Vec<u64> = inner
            .rows
            .range((Excluded(inner.start_id), std::ops::Bound::Unbounded))
            .filter(|(_, ep)| ep.scan_status == ScanStatus::New)
            .take(n)
            .map(|(id, _)| *id)
            .collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = inner.rows.get_mut(&id) {
                row.scan_status = ScanStatus::InProgress;
                claimed.push(row.clone());
            }
        }
        if !claimed.is_empty() {
            self.snapshot(&inner);
        }
        claimed
    }

    /// Marks rows in `(start_id, last_id]` currently `in-progress` as
    /// `done`, then marks rows whose id is in `failed_ids` (and are still
    /// `in-progress` at this point) as `failed`; advances `start_id` to
    /// `last_id`.
    ///
    /// Disjointness: a row already transitioned to `done` by this call is
    /// never reclassified to `failed`, even if its id also appears in
    /// `failed_ids` — `failed_ids` are excluded from the `done` sweep up
    /// front.
    pub fn settle(&self, last_id: u64, failed_ids: &[u64]) {
        let mut inner = self.inner.lock();
        let failed: HashSet<u64> = failed_ids.iter().copied().collect();
        let start_id = inner.start_id;

        let in_range: Vec<u64> = inner
            .rows
            .range((Excluded(start_id), Included(last_id)))
            .map(|(id, _)| *id)
            .collect();

        for id in in_range {
            if failed.contains(&id) {
                continue;
            }
            if let Some(row) = inner.rows.get_mut(&id) {
                if row.scan_status == ScanStatus::InProgress {
                    row.scan_status = ScanStatus::Done;
                }
            }
        }
        for id in failed_ids {
            if let Some(row) = inner.rows.get_mut(id) {
                if row.scan_status == ScanStatus::InProgress {
                    row.scan_status = ScanStatus::Failed;
                }
            }
        }

        inner.start_id = inner.start_id.max(last_id);
        self.snapshot(&inner);
    }

    /// Recovers rows left `in-progress` by a previous run, setting them
    /// back to `new`. Called once at scanner startup.
    pub fn reset_in_progress(&self) {
        let mut inner = self.inner.lock();
        let ids: Vec<u64> = inner
            .rows
            .iter()
            .filter(|(_, ep)| ep.scan_status == ScanStatus::InProgress)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(row) = inner.rows.get_mut(&id) {
                row.scan_status = ScanStatus::New;
            }
        }
        self.snapshot(&inner);
    }

    pub fn list_by_status(&self, status: ScanStatus, page: usize, per_page: usize) -> Vec<Endpoint> {
        let inner = self.inner.lock();
        inner
            .rows
            .values()
            .filter(|ep| ep.scan_status == status)
            .skip(page * per_page)
            .take(per_page)
            .cloned()
            .collect()
    }

    pub fn count_by_status(&self, status: ScanStatus) -> usize {
        let inner = self.inner.lock();
        inner.rows.values().filter(|ep| ep.scan_status == status).count()
    }

    pub fn start_id(&self) -> u64 {
        self.inner.lock().start_id
    }

    pub fn truncate(&self) {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        inner.fingerprints.clear();
        inner.next_id = 1;
        inner.start_id = 0;
        self.snapshot(&inner);
    }

    pub fn drop_table(&self) -> QueueResult<()> {
        self.truncate();
        self.store.delete_file()?;
        Ok(())
    }
}

impl EndpointSink for DurableQueue {
    fn put(&self, _target: &str, record: &Record, fingerprint: &str) -> Result<bool, String> {
        Ok(DurableQueue::put(self, record, fingerprint))
    }
}
