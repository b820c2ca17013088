//! The boundary between the Target Manager and whatever actually runs a
//! scanner. The Supervisor supplies the concrete implementation so this
//! crate never depends on process-spawning machinery directly.

use iast_model::TargetConfig;

/// A running (or recently running) scanner slot.
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    pub scanner_id: u64,
    pub host: String,
    pub port: u16,
    pub pid: Option<u32>,
}

pub trait ScannerSpawner: Send + Sync {
    /// Starts a scanner for `host:port` under `config`, tagged with the
    /// Target Manager's freshly assigned `scanner_id`. Returns the OS pid if
    /// the implementation runs one, or `None` for an in-process task.
    fn spawn(&self, scanner_id: u64, host: &str, port: u16, config: &TargetConfig) -> Option<u32>;

    /// `false` once the OS reports the pid gone.
    fn is_alive(&self, handle: &ScannerHandle) -> bool;

    /// Sends TERM, waits up to 5s, then KILL.
    fn stop(&self, handle: &ScannerHandle);
}
