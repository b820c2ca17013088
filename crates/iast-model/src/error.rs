//! Model validation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("hostless record")]
    Hostless,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;
