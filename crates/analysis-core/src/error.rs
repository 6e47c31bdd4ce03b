use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Lock not acquired within the bounded wait: {0}")]
    LockTimeout(String),

    #[error("Orphaned row referencing missing execution {0}")]
    OrphanedRow(String),

    #[error("Execution in progress: {0}")]
    ExecutionInProgress(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Classification attached to an unexpected task error, preserved the way the
/// source distinguished exception classes rather than just message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Io,
    Decode,
    Database,
    Network,
    Timeout,
    Other,
}

impl From<&AnalysisError> for ErrorKind {
    fn from(err: &AnalysisError) -> Self {
        match err {
            AnalysisError::DatabaseError(_) => ErrorKind::Database,
            AnalysisError::ApiError(_) => ErrorKind::Network,
            AnalysisError::LockTimeout(_) => ErrorKind::Timeout,
            AnalysisError::InvalidData(_) => ErrorKind::Decode,
            _ => ErrorKind::Other,
        }
    }
}
