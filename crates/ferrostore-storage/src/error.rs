use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("metadata sidecar corrupt: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl From<StorageError> for ferrostore_common::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::ObjectNotFound {
                bucket: String::new(),
                key: String::new(),
            },
            StorageError::InvalidPath(msg) => Self::invalid_request(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
