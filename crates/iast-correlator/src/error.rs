use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("correlation entry expired before the agent record arrived")]
    Expired,
    #[error("scanner shut down before the agent record arrived")]
    Cancelled,
}

pub type CorrelationResult<T> = Result<T, CorrelationError>;
