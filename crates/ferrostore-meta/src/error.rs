use thiserror::Error;

pub type MetaResult<T> = std::result::Result<T, MetaError>;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema downgrade detected: store is at version {current}, binary targets {target}")]
    DowngradeDetected { current: i64, target: i64 },

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] ferrostore_common::Error),
}

impl From<MetaError> for ferrostore_common::Error {
    fn from(err: MetaError) -> Self {
        match err {
            MetaError::NotFound => Self::internal("metadata row not found"),
            MetaError::AlreadyExists => Self::internal("metadata row already exists"),
            MetaError::Domain(e) => e,
            other => Self::Internal(other.to_string()),
        }
    }
}
