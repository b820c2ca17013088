//! The shared rate-limiting context every plugin worker task acquires
//! before sending a replay.

use iast_rate::RateDecision;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

struct GateState {
    in_flight: u32,
}

/// Gates outgoing replay sends to `max_in_flight` concurrent requests and
/// paces releases by `interval_ms`. Both bounds are updated live from the
/// Rate Scheduler's decisions.
pub struct RateGate {
    state: Mutex<GateState>,
    notify: Notify,
    max_in_flight: AtomicU32,
    interval_ms: AtomicU64,
}

impl RateGate {
    pub fn new(max_in_flight: u32, interval_ms: u64) -> Self {
        Self {
            state: Mutex::new(GateState { in_flight: 0 }),
            notify: Notify::new(),
            max_in_flight: AtomicU32::new(max_in_flight.max(1)),
            interval_ms: AtomicU64::new(interval_ms),
        }
    }

    /// Suspends until a slot is free, then occupies it.
    pub async fn acquire(&self) {
        loop {
            // Registered before the check so a release that lands between
            // the check and the `.await` below is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                let max = self.max_in_flight.load(Ordering::Relaxed);
                if state.in_flight < max {
                    state.in_flight += 1;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Frees the slot this task acquired, then sleeps the configured
    /// inter-request interval before returning.
    pub async fn release(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_one();
        let ms = self.interval_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Applies a fresh decision from the Rate Scheduler.
    pub fn apply_decision(&self, decision: &RateDecision) {
        self.max_in_flight.store(decision.max_in_flight, Ordering::Relaxed);
        self.interval_ms.store(decision.interval_ms, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn in_flight(&self) -> u32 {
        self.state.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_blocks_until_a_release_frees_a_slot() {
        let gate = Arc::new(RateGate::new(1, 0));
        gate.acquire().await;
        assert_eq!(gate.in_flight(), 1);

        let waiter_gate = gate.clone();
        let waiter = tokio::spawn(async move {
            waiter_gate.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.release().await;
        waiter.await.unwrap();
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn release_sleeps_the_configured_interval() {
        let gate = RateGate::new(2, 30);
        gate.acquire().await;
        let start = Instant::now();
        gate.release().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn apply_decision_raises_the_concurrency_cap() {
        let gate = Arc::new(RateGate::new(1, 0));
        gate.acquire().await;
        gate.apply_decision(&RateDecision { max_in_flight: 2, interval_ms: 0 });
        // A second acquire now succeeds without a prior release.
        tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await.unwrap();
        assert_eq!(gate.in_flight(), 2);
    }
}
