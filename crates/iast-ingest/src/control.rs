//! Control channel from the Supervisor for per-target "clear LRU" directives
//!. Polled by the ingest handler before each dedup check.

use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ControlDirective {
    ClearLru { target: String },
}

pub struct ControlSender(mpsc::UnboundedSender<ControlDirective>);

impl ControlSender {
    pub fn clear_lru(&self, target: impl Into<String>) {
        let _ = self.0.send(ControlDirective::ClearLru { target: target.into() });
    }
}

pub struct ControlChannel {
    rx: Mutex<mpsc::UnboundedReceiver<ControlDirective>>,
}

impl ControlChannel {
    pub fn new() -> (ControlSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ControlSender(tx), Self { rx: Mutex::new(rx) })
    }

    /// Drains every directive queued so far without blocking.
    pub fn drain(&self) -> Vec<ControlDirective> {
        let mut rx = self.rx.lock();
        let mut out = Vec::new();
        while let Ok(directive) = rx.try_recv() {
            out.push(directive);
        }
        out
    }
}
