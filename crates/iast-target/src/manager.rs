//! The Target Manager: maps targets to scanners, enforces
//! the per-process scanner cap, persists per-target configuration, and
//! exposes the admin surface.

use crate::error::{TargetError, TargetResult};
use crate::patch::{validate_patch, ConfigPatch};
use crate::spawner::{ScannerHandle, ScannerSpawner};
use iast_ingest::ControlSender;
use iast_model::{Endpoint, Finding, ScanStatus, TargetConfig};
use iast_queue::{ConfigTable, DurableQueue, ReportTable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

fn host_port(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

pub struct TargetManager {
    state_path: PathBuf,
    config: ConfigTable,
    spawner: Arc<dyn ScannerSpawner>,
    control: Option<ControlSender>,
    scanners: Mutex<HashMap<String, ScannerHandle>>,
    max_scanners: usize,
    next_scanner_id: AtomicU64,
}

impl TargetManager {
    /// `max_scanners` and `default_target_config` are sourced from
    /// `ScannerConfig` (`max_module_instance` and the rate-bound triple)
    /// at the call site; this manager has no opinion of its own on them.
    pub fn new(
        state_path: &Path,
        spawner: Arc<dyn ScannerSpawner>,
        control: Option<ControlSender>,
        max_scanners: usize,
        default_target_config: TargetConfig,
    ) -> Self {
        Self {
            state_path: state_path.to_path_buf(),
            config: ConfigTable::open(state_path, default_target_config),
            spawner,
            control,
            scanners: Mutex::new(HashMap::new()),
            max_scanners,
            next_scanner_id: AtomicU64::new(1),
        }
    }

    /// Reclaims any slot whose process the OS no longer reports
    ///.
    fn reap(&self) {
        let mut scanners = self.scanners.lock();
        let dead: Vec<String> = scanners
            .iter()
            .filter(|(_, handle)| !self.spawner.is_alive(handle))
            .map(|(key, _)| key.clone())
            .collect();
        for key in dead {
            scanners.remove(&key);
        }
    }

    pub fn start_target(&self, host: &str, port: u16) -> TargetResult<ScannerHandle> {
        self.reap();
        let key = host_port(host, port);

        let mut scanners = self.scanners.lock();
        if scanners.len() >= self.max_scanners {
            return Err(TargetError::ScannerCapReached);
        }
        if scanners.contains_key(&key) {
            return Err(TargetError::TargetAlreadyRunning(key));
        }

        let cfg = self.config.ensure(&key);
        let scanner_id = self.next_scanner_id.fetch_add(1, Ordering::SeqCst);
        let pid = self.spawner.spawn(scanner_id, host, port, &cfg);
        let handle = ScannerHandle { scanner_id, host: host.to_string(), port, pid };
        scanners.insert(key, handle.clone());
        info!(host, port, scanner_id, "target scanner started");
        Ok(handle)
    }

    pub fn stop_target(&self, scanner_id: u64) -> TargetResult<()> {
        let mut scanners = self.scanners.lock();
        let key = scanners
            .iter()
            .find(|(_, handle)| handle.scanner_id == scanner_id)
            .map(|(key, _)| key.clone())
            .ok_or(TargetError::TargetNotRunning(scanner_id))?;
        let handle = scanners.remove(&key).expect("key came from this map");
        self.spawner.stop(&handle);
        info!(scanner_id, "target scanner stopped");
        Ok(())
    }

    pub fn clean_target(&self, host: &str, port: u16, url_only: bool) -> TargetResult<()> {
        let key = host_port(host, port);
        if self.scanners.lock().contains_key(&key) {
            return Err(TargetError::TargetHasLiveScanner(key));
        }

        let queue = DurableQueue::open(&self.state_path, host, port);
        if url_only {
            queue.truncate();
        } else {
            queue.truncate();
            let reports = ReportTable::open(&self.state_path, host, port);
            reports.truncate();
            self.config.remove(&key);
        }
        if let Some(control) = &self.control {
            control.clear_lru(key);
        }
        Ok(())
    }

    pub fn get_config(&self, host: &str, port: u16) -> Option<TargetConfig> {
        self.config.get(&host_port(host, port))
    }

    pub fn set_config(&self, host: &str, port: u16, patch: ConfigPatch) -> TargetResult<TargetConfig> {
        validate_patch(&patch)?;
        let key = host_port(host, port);
        Ok(self.config.set(&key, |cfg| {
            if let Some(enabled) = patch.enabled_plugins {
                cfg.enabled_plugins = enabled;
            }
            if let Some(rate_bounds) = patch.rate_bounds {
                cfg.rate_bounds = rate_bounds;
            }
            if let Some(regex) = patch.skip_url_regex {
                cfg.skip_url_regex = regex;
            }
            if let Some(proxy) = patch.upstream_proxy {
                cfg.upstream_proxy = proxy;
            }
        }))
    }

    pub fn list_targets(&self, page: usize, per_page: usize) -> Vec<TargetConfig> {
        self.config.list(page, per_page)
    }

    pub fn list_urls(
        &self,
        host: &str,
        port: u16,
        status: ScanStatus,
        page: usize,
        per_page: usize,
    ) -> Vec<Endpoint> {
        DurableQueue::open(&self.state_path, host, port).list_by_status(status, page, per_page)
    }

    pub fn get_report(&self, host: &str, port: u16, page: usize, per_page: usize) -> Vec<Finding> {
        ReportTable::open(&self.state_path, host, port).list(page, per_page)
    }

    pub fn set_auto_start(&self, flag: bool) {
        self.config.set_auto_start(flag);
    }

    pub fn get_auto_start(&self) -> bool {
        self.config.get_global_flags().auto_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct StubSpawner {
        alive: AtomicBool,
    }

    impl ScannerSpawner for StubSpawner {
        fn spawn(&self, _scanner_id: u64, _host: &str, _port: u16, _config: &TargetConfig) -> Option<u32> {
            self.alive.store(true, Ordering::SeqCst);
            Some(4242)
        }

        fn is_alive(&self, _handle: &ScannerHandle) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn stop(&self, _handle: &ScannerHandle) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    fn manager(dir: &Path, cap: usize) -> TargetManager {
        let spawner = Arc::new(StubSpawner { alive: AtomicBool::new(false) });
        TargetManager::new(dir, spawner, None, cap, TargetConfig::default())
    }

    #[test]
    fn start_target_fails_once_cap_is_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        mgr.start_target("a.com", 80).unwrap();
        let err = mgr.start_target("b.com", 80).unwrap_err();
        assert!(matches!(err, TargetError::ScannerCapReached));
    }

    #[test]
    fn start_target_rejects_a_second_scanner_for_the_same_target() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 5);
        mgr.start_target("a.com", 80).unwrap();
        let err = mgr.start_target("a.com", 80).unwrap_err();
        assert!(matches!(err, TargetError::TargetAlreadyRunning(_)));
    }

    #[test]
    fn stop_target_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        let handle = mgr.start_target("a.com", 80).unwrap();
        mgr.stop_target(handle.scanner_id).unwrap();
        // The slot is free again.
        mgr.start_target("b.com", 80).unwrap();
    }

    #[test]
    fn clean_target_is_forbidden_while_a_scanner_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        mgr.start_target("a.com", 80).unwrap();
        let err = mgr.clean_target("a.com", 80, true).unwrap_err();
        assert!(matches!(err, TargetError::TargetHasLiveScanner(_)));
    }

    #[test]
    fn set_config_bumps_version_and_rejects_invalid_patches() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        mgr.start_target("a.com", 80).unwrap();

        let bad = ConfigPatch { skip_url_regex: Some("(".into()), ..Default::default() };
        assert!(mgr.set_config("a.com", 80, bad).is_err());

        let good = ConfigPatch { skip_url_regex: Some("^/health$".into()), ..Default::default() };
        let cfg = mgr.set_config("a.com", 80, good).unwrap();
        assert_eq!(cfg.version, 1);
    }

    #[test]
    fn auto_start_flag_roundtrips_through_the_manager() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1);
        assert!(!mgr.get_auto_start());
        mgr.set_auto_start(true);
        assert!(mgr.get_auto_start());
    }
}
