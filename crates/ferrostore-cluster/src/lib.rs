//! Cluster coordinator (§4.11): peer registry, health probing, entity sync
//! with canonical-checksum convergence, and deletion tombstones.

pub mod checksum;
pub mod error;
pub mod healthprobe;
pub mod registry;
pub mod sync;

pub use checksum::canonical_checksum;
pub use error::{ClusterError, ClusterResult};
pub use healthprobe::HealthProber;
pub use registry::{BucketSummary, PeerRegistry};
pub use sync::SyncCoordinator;
