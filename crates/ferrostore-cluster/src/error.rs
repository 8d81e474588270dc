use thiserror::Error;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("peer request failed: {0}")]
    Transport(String),

    #[error("peer {0} returned an error response")]
    Peer(uuid::Uuid),

    #[error("peer {0} is not registered")]
    UnknownPeer(uuid::Uuid),

    #[error("metadata store error: {0}")]
    Meta(#[from] ferrostore_meta::MetaError),

    #[error("{0}")]
    Common(#[from] ferrostore_common::Error),

    #[error("checksum serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
