//! Explicit, value-based plugin registration (REDESIGN FLAGS §9 — replaces
//! the original's reflection-based plugin discovery with an up-front table
//! the Supervisor/Target Manager can validate at startup).

use crate::plugin::Plugin;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin {0:?} is already registered")]
    DuplicateName(&'static str),
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<&'static str, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin`. Rejects a second registration under the same
    /// name rather than silently overwriting it.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name();
        if self.plugins.contains_key(name) {
            return Err(PluginError::DuplicateName(name));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.plugins.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Batch, CheckOutcome, CheckedBatch};
    use iast_model::Record;

    struct StubPlugin(&'static str);
    impl Plugin for StubPlugin {
        fn name(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &'static str {
            "stub"
        }
        fn mutate(&self, _record: &Record) -> Vec<Batch> {
            Vec::new()
        }
        fn check(&self, _batch: &CheckedBatch<'_>) -> Option<CheckOutcome> {
            None
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(StubPlugin("sql_basic"))).unwrap();
        let err = registry.register(Arc::new(StubPlugin("sql_basic"))).unwrap_err();
        assert_eq!(err, PluginError::DuplicateName("sql_basic"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(StubPlugin("sql_basic"))).unwrap();
        registry.register(Arc::new(StubPlugin("command_basic"))).unwrap();
        assert_eq!(registry.names(), vec!["command_basic", "sql_basic"]);
    }
}
