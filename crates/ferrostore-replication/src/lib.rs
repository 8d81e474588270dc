//! Cross-region and intra-cluster replication engine (§4.10).
//!
//! Mutations enqueue a work item per matching [`models::ReplicationRule`]
//! (`ferrostore_meta::models`); a pool of [`dispatcher::ReplicationDispatcher`]
//! workers claims due items and drives them through a [`executor::ReplicationExecutor`].

pub mod backoff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod sign;

pub use dispatcher::ReplicationDispatcher;
pub use error::{ReplicationError, ReplicationResult};
pub use executor::{ClusterExecutor, ExternalS3Executor, ReplicationExecutor, ReplicationObject};
