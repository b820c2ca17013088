//! Attack Plugins: independent modules each implementing
//! `mutate(record) → request batches` and `check(batch) → optional finding`.

#![forbid(unsafe_code)]

mod builtins;
mod plugin;
mod registry;

use std::sync::Arc;

pub use builtins::{CommandBasic, DirectoryBasic, FileUploadBasic, IncludeBasic, SqlBasic, XxeBasic};
pub use plugin::{Batch, CheckOutcome, CheckedBatch, CorrelatedRequest, PlannedRequest, Plugin};
pub use registry::{PluginError, PluginRegistry};

/// Builds the registry of plugins shipped with the scanner. Each name is
/// registered exactly once; this never fails in practice since the names
/// here are distinct by construction.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(CommandBasic),
        Arc::new(DirectoryBasic),
        Arc::new(SqlBasic),
        Arc::new(IncludeBasic),
        Arc::new(FileUploadBasic),
        Arc::new(XxeBasic),
    ];
    for plugin in plugins {
        registry.register(plugin).expect("built-in plugin names are distinct");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_one_entry_per_plugin() {
        let registry = builtin_registry();
        assert_eq!(
            registry.names(),
            vec!["command_basic", "directory_basic", "fileupload_basic", "include_basic", "sql_basic", "xxe_basic"]
        );
    }
}
