//! Per-target configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The reserved config key holding the template for newly created targets.
pub const DEFAULT_CONFIG_KEY: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateBounds {
    pub max_concurrent: u32,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for RateBounds {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            min_interval_ms: 50,
            max_interval_ms: 300,
        }
    }
}

impl RateBounds {
    /// Rate-bound validity for `set_config`: non-negative and `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min_interval_ms <= self.max_interval_ms
    }
}

/// Per-host:port scanner configuration, keyed by its `host_port` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host_port: String,
    pub enabled_plugins: HashMap<String, bool>,
    pub rate_bounds: RateBounds,
    /// Regex of URL paths to skip.
    pub skip_url_regex: String,
    pub upstream_proxy: Option<String>,
    pub version: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host_port: DEFAULT_CONFIG_KEY.to_string(),
            enabled_plugins: HashMap::new(),
            rate_bounds: RateBounds::default(),
            skip_url_regex: String::new(),
            upstream_proxy: None,
            version: 0,
        }
    }
}

impl TargetConfig {
    /// A fresh config for `host_port`, copied from the `default` template
    ///.
    pub fn from_default(default: &TargetConfig, host_port: impl Into<String>) -> Self {
        Self {
            host_port: host_port.into(),
            enabled_plugins: default.enabled_plugins.clone(),
            rate_bounds: RateBounds {
                max_concurrent: default.rate_bounds.max_concurrent,
                min_interval_ms: default.rate_bounds.min_interval_ms,
                max_interval_ms: default.rate_bounds.max_interval_ms,
            },
            skip_url_regex: default.skip_url_regex.clone(),
            upstream_proxy: default.upstream_proxy.clone(),
            version: 0,
        }
    }
}

/// Normalizes a host for use in a table name: `_` becomes `-`
///.
pub fn normalize_host(host: &str) -> String {
    host.replace('_', "-")
}

/// Deterministic Durable Queue table name for a target.
pub fn result_list_table(host: &str, port: u16) -> String {
    format!("{}_{}_ResultList", normalize_host(host), port)
}

/// Deterministic Report table name for a target.
pub fn report_table(host: &str, port: u16) -> String {
    format!("{}_{}_Report", normalize_host(host), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_normalize_underscores() {
        assert_eq!(result_list_table("a_b.com", 8080), "a-b.com_8080_ResultList");
        assert_eq!(report_table("a_b.com", 8080), "a-b.com_8080_Report");
    }

    #[test]
    fn rate_bounds_validity() {
        let mut b = RateBounds::default();
        assert!(b.is_valid());
        b.min_interval_ms = 1000;
        b.max_interval_ms = 10;
        assert!(!b.is_valid());
    }
}
