use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("no progress record for execution {0}")]
    NotFound(String),

    #[error("lock not acquired for execution {0} within the bounded wait")]
    LockTimeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
