//! Shared state every S3 handler closes over.

use std::sync::Arc;

use ferrostore_common::concurrency::KeyedMutexRegistry;
use ferrostore_common::config::{MultipartConfig, S3Config};
use ferrostore_common::path::PathSandbox;
use ferrostore_meta::MetaStore;
use ferrostore_replication::ReplicationDispatcher;
use ferrostore_storage::FilesystemBackend;

use crate::auth::RequestAuthenticator;

pub struct S3State {
    pub meta: Arc<MetaStore>,
    pub storage: Arc<FilesystemBackend>,
    pub sandbox: PathSandbox,
    pub auth: RequestAuthenticator,
    pub replication: Arc<ReplicationDispatcher>,
    pub s3_config: S3Config,
    pub multipart_config: MultipartConfig,
    /// Serializes the read-modify-write critical section around a given
    /// `<bucket>/<key>` or multipart upload id (§5).
    pub locks: KeyedMutexRegistry,
}
