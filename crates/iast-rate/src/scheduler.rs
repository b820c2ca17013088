//! The Rate Scheduler: one instance per scanner, ticked by
//! the Supervisor every `schedule_interval`, adjusting `max_in_flight` and
//! `interval_ms` from failure trend and host CPU.

use iast_model::RateBounds;
use parking_lot::Mutex;
use tracing::debug;

/// cpu_high/cpu_low gate the decrease/increase decision.
#[derive(Debug, Clone, Copy)]
pub struct RateThresholds {
    pub cpu_high: f32,
    pub cpu_low: f32,
}

impl Default for RateThresholds {
    fn default() -> Self {
        Self { cpu_high: 80.0, cpu_low: 50.0 }
    }
}

/// One tick's raw observations, gathered by the caller (the scanner's
/// counters plus a fresh CPU read) and handed to [`RateScheduler::tick`].
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub cpu_percent: f32,
    pub requests_sent: u64,
    pub correlated_timeouts: u64,
    pub failed_requests: u64,
    pub interval_elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub max_in_flight: u32,
    pub interval_ms: u64,
}

struct State {
    c: u32,
    r: u64,
    penalty: u32,
    consecutive_decreases: u32,
    prev_timeouts: u64,
    prev_failed: u64,
    maxed: bool,
}

/// Adaptive (max-in-flight, interval) tuner for one scanner.
/// Initial state: `c = 1`, `r = min_interval_ms`.
pub struct RateScheduler {
    bounds: RateBounds,
    thresholds: RateThresholds,
    state: Mutex<State>,
}

impl RateScheduler {
    pub fn new(bounds: RateBounds, thresholds: RateThresholds) -> Self {
        let r = bounds.min_interval_ms;
        Self {
            bounds,
            thresholds,
            state: Mutex::new(State {
                c: 1,
                r,
                penalty: 0,
                consecutive_decreases: 0,
                prev_timeouts: 0,
                prev_failed: 0,
                maxed: false,
            }),
        }
    }

    pub fn current(&self) -> RateDecision {
        let s = self.state.lock();
        RateDecision { max_in_flight: s.c, interval_ms: s.r }
    }

    /// Applies one scheduling tick and returns the resulting (max_in_flight,
    /// interval_ms) pair.
    pub fn tick(&self, obs: Observation) -> RateDecision {
        let mut s = self.state.lock();

        let fail_increasing = obs.correlated_timeouts > s.prev_timeouts || obs.failed_requests > s.prev_failed;
        s.prev_timeouts = obs.correlated_timeouts;
        s.prev_failed = obs.failed_requests;

        let full_concurrency = obs.interval_elapsed_ms > 0
            && (obs.requests_sent as f64 / obs.interval_elapsed_ms as f64) * s.r as f64 >= s.c as f64;

        let decrease = fail_increasing || obs.cpu_percent > self.thresholds.cpu_high;
        let increase = full_concurrency && obs.cpu_percent < self.thresholds.cpu_low;

        if decrease {
            s.consecutive_decreases = (s.consecutive_decreases + 1).min(100);
            s.penalty = (s.penalty + 1 + s.consecutive_decreases).min(100);
            s.maxed = false;
            self.apply_decrease(&mut s);
        } else if increase {
            if s.penalty > 0 {
                // A successful increase is preceded by paying down the
                // penalty counter one tick at a time.
                s.penalty -= 1;
            } else {
                s.consecutive_decreases = 0;
                if !s.maxed {
                    self.apply_increase(&mut s);
                }
            }
        }

        debug!(max_in_flight = s.c, interval_ms = s.r, penalty = s.penalty, "rate scheduler tick");
        RateDecision { max_in_flight: s.c, interval_ms: s.r }
    }

    fn apply_decrease(&self, s: &mut State) {
        let b = &self.bounds;
        if s.r < 128 && b.max_interval_ms >= 128 {
            s.r = (2 * s.r).max(16);
        } else if s.c > 1 {
            s.c -= 1;
        } else {
            s.r += (b.max_interval_ms - b.min_interval_ms) / 10;
        }
        s.r = s.r.min(b.max_interval_ms);
    }

    fn apply_increase(&self, s: &mut State) {
        let b = &self.bounds;
        if s.r > 128 {
            let step = (b.max_interval_ms - b.min_interval_ms) / 10;
            s.r = s.r.saturating_sub(step).max(128);
        } else if s.c < b.max_concurrent {
            s.c += 1;
        } else {
            s.r = (s.r / 2).max(b.min_interval_ms);
        }
        if s.c == b.max_concurrent && s.r == b.min_interval_ms {
            s.maxed = true;
        }
    }
}
