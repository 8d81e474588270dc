//! Filesystem storage backend for ferrostore (§4.2).

pub mod backend;
pub mod error;
pub mod metadata;

pub use backend::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use metadata::{ObjectInfo, ObjectMetadata, DIRECTORY_CONTENT_TYPE, DIRECTORY_ETAG, DIRECTORY_MARKER};
