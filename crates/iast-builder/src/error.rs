use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("content-type {0:?} is unsupported for bodies >= 4 KiB")]
    UnsupportedContentType(String),
    #[error("json path does not address an existing container")]
    InvalidJsonPath,
    #[error("file index {0} is out of range ({1} files attached)")]
    FileIndexOutOfRange(usize, usize),
    #[error("file mutation requires byte content")]
    FileContentNotBytes,
}

pub type BuilderResult<T> = Result<T, BuilderError>;
