//! YAML configuration file surface.
//!
//! Missing keys are filled from defaults; unknown top-level keys are
//! ignored; a section that fails to parse against its expected shape falls
//! back to that section's defaults with a warning, rather than failing the
//! whole load.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub http_port: u16,
    pub api_path: String,
    pub process_num: u32,
    pub request_lru_size: usize,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self { http_port: 8086, api_path: "/".to_string(), process_num: 4, request_lru_size: 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub max_module_instance: u32,
    pub max_concurrent_request: u32,
    pub min_request_interval: u64,
    pub max_request_interval: u64,
    pub request_timeout: u64,
    pub retry_times: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_module_instance: 8,
            max_concurrent_request: 5,
            min_request_interval: 50,
            max_request_interval: 300,
            request_timeout: 5,
            retry_times: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub console_port: u16,
    pub schedule_interval: u64,
    pub max_cpu: f32,
    pub min_cpu: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { console_port: 8087, schedule_interval: 10, max_cpu: 80.0, min_cpu: 50.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub path: String,
    pub level: String,
    pub rotate_size: u64,
    pub rotate_num: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { path: "/var/log/iast".to_string(), level: "info".to_string(), rotate_size: 50_000_000, rotate_num: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 3306, username: String::new(), password: String::new(), db_name: "iast".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudApiConfig {
    pub enable: bool,
    pub backend_url: String,
    pub app_secret: String,
    pub app_id: String,
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self { enable: false, backend_url: String::new(), app_secret: String::new(), app_id: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub preprocessor: PreprocessorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cloud_api: CloudApiConfig,
}

fn section<T>(doc: &serde_yaml::Value, key: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match doc.get(key) {
        None => T::default(),
        Some(value) => serde_yaml::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(section = key, error = %e, "config section malformed, using defaults");
            T::default()
        }),
    }
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::parse(&text)
    }

    /// Parses a YAML document permissively: missing keys fall back to
    /// defaults per-section, unknown top-level keys are dropped silently,
    /// and a section whose shape doesn't match falls back to its defaults
    /// with a warning rather than aborting the whole load.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|source| ConfigError::Parse { path: "<config>".to_string(), source })?;

        Ok(Config {
            preprocessor: section(&doc, "preprocessor"),
            scanner: section(&doc, "scanner"),
            monitor: section(&doc, "monitor"),
            log: section(&doc, "log"),
            database: section(&doc, "database"),
            cloud_api: section(&doc, "cloud_api"),
        })
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let text = serde_yaml::to_string(self).expect("Config serializes");
        std::fs::write(path, text).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })
    }
}
