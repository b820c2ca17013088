use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage fatal: {0}")]
    StorageFatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;
