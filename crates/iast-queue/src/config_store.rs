//! The single `Config` table, keyed by `<host>_<port>` plus the reserved
//! `default` and `all` keys.

use iast_model::{TargetConfig, DEFAULT_CONFIG_KEY};
use iast_persist::JsonStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

/// The reserved key under which fleet-wide flags (currently just
/// `auto_start`) live.
pub const ALL_KEY: &str = "all";

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GlobalFlags {
    pub auto_start: bool,
}

struct Inner {
    configs: HashMap<String, TargetConfig>,
    global: GlobalFlags,
}

pub struct ConfigTable {
    inner: Mutex<Inner>,
    store: JsonStore,
    global_store: JsonStore,
}

impl ConfigTable {
    /// Opens the table, seeding the `default` template row from `default`
    /// on first use (a pre-existing store keeps whatever `default` row it
    /// already has on disk).
    pub fn open(state_path: &Path, default: TargetConfig) -> Self {
        let store = JsonStore::new(state_path, "Config");
        let global_store = JsonStore::new(state_path, "Config_all");
        let mut configs: HashMap<String, TargetConfig> = store.load();
        configs
            .entry(DEFAULT_CONFIG_KEY.to_string())
            .or_insert(default);
        let global = global_store
            .load::<GlobalFlags>()
            .remove(ALL_KEY)
            .unwrap_or_default();
        Self {
            inner: Mutex::new(Inner { configs, global }),
            store,
            global_store,
        }
    }

    fn snapshot(&self, inner: &Inner) {
        let _ = self.store.save(&inner.configs);
    }

    pub fn get(&self, host_port: &str) -> Option<TargetConfig> {
        self.inner.lock().configs.get(host_port).cloned()
    }

    pub fn default_template(&self) -> TargetConfig {
        self.inner
            .lock()
            .configs
            .get(DEFAULT_CONFIG_KEY)
            .cloned()
            .unwrap_or_default()
    }

    /// Ensures a config row exists for `host_port`, copied from the
    /// `default` template on first creation.
    pub fn ensure(&self, host_port: &str) -> TargetConfig {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.configs.get(host_port) {
            return existing.clone();
        }
        let default = inner
            .configs
            .get(DEFAULT_CONFIG_KEY)
            .cloned()
            .unwrap_or_default();
        let fresh = TargetConfig::from_default(&default, host_port);
        inner.configs.insert(host_port.to_string(), fresh.clone());
        self.snapshot(&inner);
        fresh
    }

    /// Applies `patch` (a closure mutating a clone of the current config)
    /// and bumps the version counter on success, so a live scanner observes
    /// the advance.
    pub fn set(&self, host_port: &str, patch: impl FnOnce(&mut TargetConfig)) -> TargetConfig {
        let mut inner = self.inner.lock();
        let mut cfg = inner
            .configs
            .get(host_port)
            .cloned()
            .unwrap_or_else(|| TargetConfig::from_default(&TargetConfig::default(), host_port));
        patch(&mut cfg);
        cfg.version += 1;
        inner.configs.insert(host_port.to_string(), cfg.clone());
        self.snapshot(&inner);
        cfg
    }

    pub fn remove(&self, host_port: &str) {
        let mut inner = self.inner.lock();
        inner.configs.remove(host_port);
        self.snapshot(&inner);
    }

    pub fn list(&self, page: usize, per_page: usize) -> Vec<TargetConfig> {
        let inner = self.inner.lock();
        let mut all: Vec<TargetConfig> = inner
            .configs
            .values()
            .filter(|c| c.host_port != DEFAULT_CONFIG_KEY && c.host_port != ALL_KEY)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.host_port.cmp(&b.host_port));
        all.into_iter().skip(page * per_page).take(per_page).collect()
    }

    pub fn get_global_flags(&self) -> GlobalFlags {
        self.inner.lock().global.clone()
    }

    pub fn set_auto_start(&self, flag: bool) {
        let mut inner = self.inner.lock();
        inner.global.auto_start = flag;
        let mut map = HashMap::new();
        map.insert(ALL_KEY.to_string(), inner.global.clone());
        let _ = self.global_store.save(&map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_copies_default_template() {
        let dir = tempfile::tempdir().unwrap();
        let table = ConfigTable::open(dir.path(), TargetConfig::default());
        table.set(DEFAULT_CONFIG_KEY, |c| c.rate_bounds.max_concurrent = 9);
        let cfg = table.ensure("x.com:80");
        assert_eq!(cfg.rate_bounds.max_concurrent, 9);
        assert_eq!(cfg.version, 0);
    }

    #[test]
    fn set_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let table = ConfigTable::open(dir.path(), TargetConfig::default());
        table.ensure("x.com:80");
        let v1 = table.set("x.com:80", |c| c.upstream_proxy = Some("http://p".into()));
        assert_eq!(v1.version, 1);
        let v2 = table.set("x.com:80", |c| c.upstream_proxy = None);
        assert_eq!(v2.version, 2);
    }

    #[test]
    fn auto_start_flag_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let table = ConfigTable::open(dir.path(), TargetConfig::default());
        assert!(!table.get_global_flags().auto_start);
        table.set_auto_start(true);
        assert!(table.get_global_flags().auto_start);
    }
}
