use thiserror::Error;

pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("destination rejected request: {0}")]
    Destination(String),

    #[error("outbound request failed: {0}")]
    Transport(String),

    #[error("source object vanished before it could be replicated: {bucket}/{key}")]
    SourceMissing { bucket: String, key: String },

    #[error("metadata store error: {0}")]
    Meta(#[from] ferrostore_meta::MetaError),

    #[error("storage backend error: {0}")]
    Storage(#[from] ferrostore_storage::StorageError),

    #[error("{0}")]
    Common(#[from] ferrostore_common::Error),

    #[error("rule {0} has neither an external nor a cluster destination configured")]
    NoDestination(uuid::Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Destination(_))
    }
}
