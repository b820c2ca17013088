use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("parse {path}: {source}")]
    Parse { path: String, #[source] source: serde_yaml::Error },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
