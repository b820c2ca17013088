//! The Sink Correlator: a bounded in-memory table keyed by
//! scan_request_id. A replayer registers an id before sending its request,
//! then awaits the agent record the Ingest Server routes back for that id.

use crate::error::{CorrelationError, CorrelationResult};
use iast_model::Record;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::trace;

struct Waiter {
    tx: oneshot::Sender<Record>,
}

struct Inner {
    waiters: HashMap<String, Waiter>,
    /// Min-heap of (expiry, id), so `deliver` can cheaply walk and evict the
    /// expired prefix without scanning every pending entry.
    expiries: BinaryHeap<Reverse<(Instant, String)>>,
    dropped: u64,
    expired: u64,
}

/// A pending correlation, returned by [`Correlator::register`]. Consumed by
/// [`Correlator::wait`].
pub struct Ticket {
    id: String,
    rx: oneshot::Receiver<Record>,
    deadline: Instant,
}

impl Ticket {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Bounded table of in-flight scan_request_id → waiting replayer.
///
/// Entries expire after `2 × timeout × (retry_budget + 1)`, matching the
/// worst case a Per-Target Scanner's retry loop can take before giving up
/// on a single replay.
pub struct Correlator {
    inner: Mutex<Inner>,
    timeout: Duration,
    retry_budget: u32,
}

impl Correlator {
    pub fn new(timeout: Duration, retry_budget: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                waiters: HashMap::new(),
                expiries: BinaryHeap::new(),
                dropped: 0,
                expired: 0,
            }),
            timeout,
            retry_budget,
        }
    }

    fn entry_lifetime(&self) -> Duration {
        self.timeout * 2 * (self.retry_budget + 1)
    }

    /// Establishes a waiter for `id`. A second `register` for the same id
    /// replaces the first waiter (the scanner never reuses a scan_request_id
    /// across in-flight replays, so this only happens after the first
    /// waiter already expired).
    pub fn register(&self, id: impl Into<String>) -> Ticket {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.entry_lifetime();
        let mut inner = self.inner.lock();
        inner.waiters.insert(id.clone(), Waiter { tx });
        inner.expiries.push(Reverse((deadline, id.clone())));
        Ticket { id, rx, deadline }
    }

    /// Routes `record` to its matching waiter, if any. Returns `true` if a
    /// waiter was found and woken. Also walks the head of the expiry heap
    /// and drops any entries whose deadline has passed.
    pub fn deliver(&self, record: Record) -> bool {
        let mut inner = self.inner.lock();
        self.evict_expired(&mut inner);

        match inner.waiters.remove(&record.scan_request_id) {
            Some(waiter) => {
                let _ = waiter.tx.send(record);
                true
            }
            None => {
                inner.dropped += 1;
                trace!(id = %record.scan_request_id, "correlator: no waiter for delivered record");
                false
            }
        }
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let now = Instant::now();
        while let Some(Reverse((deadline, _))) = inner.expiries.peek() {
            if *deadline > now {
                break;
            }
            let Reverse((_, id)) = inner.expiries.pop().unwrap();
            if inner.waiters.remove(&id).is_some() {
                inner.expired += 1;
            }
        }
    }

    /// Awaits the record for `ticket`, blocking up to its remaining time.
    pub async fn wait(&self, ticket: Ticket) -> CorrelationResult<Record> {
        let remaining = ticket.deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, ticket.rx).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(_recv_dropped)) => Err(CorrelationError::Cancelled),
            Err(_elapsed) => {
                let mut inner = self.inner.lock();
                inner.waiters.remove(&ticket.id);
                Err(CorrelationError::Expired)
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn expired_count(&self) -> u64 {
        self.inner.lock().expired
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}
