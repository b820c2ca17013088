use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("scanner cap reached")]
    ScannerCapReached,

    #[error("target {0} already has a running scanner")]
    TargetAlreadyRunning(String),

    #[error("no running scanner for id {0}")]
    TargetNotRunning(u64),

    #[error("target {0} has a live scanner")]
    TargetHasLiveScanner(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type TargetResult<T> = Result<T, TargetError>;
