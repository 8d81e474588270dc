use thiserror::Error;

pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("source bucket {0} not found")]
    SourceMissing(String),

    #[error("destination bucket {0} not found")]
    DestinationMissing(String),

    #[error("source and destination bucket are the same: {0}")]
    CircularReference(String),

    #[error("metadata store error: {0}")]
    Meta(#[from] ferrostore_meta::MetaError),

    #[error("storage backend error: {0}")]
    Storage(#[from] ferrostore_storage::StorageError),

    #[error("{0}")]
    Common(#[from] ferrostore_common::Error),
}
