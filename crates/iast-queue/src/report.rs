//! Per-target Report table.

use iast_model::{report_table, Finding};
use iast_persist::JsonStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

struct ReportInner {
    rows: HashMap<String, Finding>,
}

fn report_key(plugin_name: &str, payload_sequence_id: &str) -> String {
    format!("{plugin_name}:{payload_sequence_id}")
}

/// The per-target findings table. Reporting the same
/// `(plugin_name, payload_sequence_id)` pair twice is a no-op — it returns
/// `false` ("not new") rather than erroring.
pub struct ReportTable {
    inner: Mutex<ReportInner>,
    store: JsonStore,
}

impl ReportTable {
    pub fn open(state_path: &Path, host: &str, port: u16) -> Self {
        let store = JsonStore::new(state_path, &report_table(host, port));
        let rows = store.load();
        Self {
            inner: Mutex::new(ReportInner { rows }),
            store,
        }
    }

    /// Inserts `finding`, keyed by `(plugin_name, payload_sequence_id)`.
    /// Returns `true` if this was a new row.
    pub fn report(&self, finding: Finding) -> bool {
        let key = report_key(&finding.plugin_name, &finding.payload_sequence_id);
        let mut inner = self.inner.lock();
        if inner.rows.contains_key(&key) {
            return false;
        }
        inner.rows.insert(key, finding);
        let _ = self.store.save(&inner.rows);
        true
    }

    pub fn list(&self, page: usize, per_page: usize) -> Vec<Finding> {
        let inner = self.inner.lock();
        let mut findings: Vec<Finding> = inner.rows.values().cloned().collect();
        findings.sort_by_key(|f| f.timestamp);
        findings.into_iter().skip(page * per_page).take(per_page).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn truncate(&self) {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        let _ = self.store.save(&inner.rows);
    }

    pub fn drop_table(&self) -> std::io::Result<()> {
        self.truncate();
        self.store.delete_file()
    }
}
