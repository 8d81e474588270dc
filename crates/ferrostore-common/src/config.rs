//! Layered configuration tree for ferrostore (file + env, via the `config` crate).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Root configuration for a ferrostore gateway instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub s3: S3Config,
    pub auth: AuthConfig,
    pub multipart: MultipartConfig,
    pub replication: ReplicationConfig,
    pub cluster: ClusterConfig,
    pub audit: AuditConfig,
    pub inventory: InventoryWorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            s3: S3Config::default(),
            auth: AuthConfig::default(),
            multipart: MultipartConfig::default(),
            replication: ReplicationConfig::default(),
            cluster: ClusterConfig::default(),
            audit: AuditConfig::default(),
            inventory: InventoryWorkerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration layering, in increasing priority: built-in
    /// defaults, an optional config file, then `FERROSTORE_*` environment
    /// variables (e.g. `FERROSTORE_S3__REGION=eu-west-1`).
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FERROSTORE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Node identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: String,
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "ferrostore-node".to_string(),
            data_dir: PathBuf::from("/var/lib/ferrostore"),
        }
    }
}

/// Filesystem storage backend configuration (§4.2).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory objects and their sidecar metadata are written under.
    pub root_dir: PathBuf,
    /// Directory marker filename (a zero-byte file placed in an otherwise
    /// empty "folder" so it can be listed).
    pub directory_marker: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/var/lib/ferrostore/objects"),
            directory_marker: ".ferrostore-folder".to_string(),
        }
    }
}

/// Listener addresses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub s3_listen: SocketAddr,
    pub metrics_listen: SocketAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            s3_listen: "0.0.0.0:9000".parse().unwrap(),
            metrics_listen: "0.0.0.0:9090".parse().unwrap(),
        }
    }
}

/// S3 API behavior configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,
    pub max_object_size: u64,
    pub virtual_host_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            max_object_size: 5 * 1024 * 1024 * 1024 * 1024, // 5 TiB
            virtual_host_style: true,
        }
    }
}

/// Auth Manager configuration (§4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Allowed clock skew for SigV2/SigV4 request date headers.
    pub max_clock_skew_secs: i64,
    /// JWT signing secret (should be overridden via env/secret file in production).
    pub jwt_secret: String,
    /// JWT access token lifetime.
    pub jwt_ttl_secs: i64,
    /// Console login lockout threshold.
    pub max_login_attempts: u32,
    /// Console login lockout duration.
    pub lockout_duration_secs: u64,
    /// Per-IP request rate limit (requests/sec) for unauthenticated endpoints.
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_clock_skew_secs: 15 * 60,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_ttl_secs: 3600,
            max_login_attempts: 5,
            lockout_duration_secs: 15 * 60,
            rate_limit_per_sec: 20,
            rate_limit_burst: 40,
        }
    }
}

/// Multipart upload configuration (§4.6/§9 Open Question resolution).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            min_part_size: 5 * 1024 * 1024,          // 5 MiB
            max_part_size: 5 * 1024 * 1024 * 1024,   // 5 GiB
            max_parts: 10_000,
        }
    }
}

/// Replication Engine configuration (§4.10).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub worker_count: usize,
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_retries: 8,
            initial_backoff_secs: 1,
            max_backoff_secs: 300,
        }
    }
}

/// Cluster Coordinator configuration (§4.11).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Durable identity of this node within `cluster_nodes`. Generated once
    /// and persisted to the config file; never regenerated on restart.
    pub node_id: Uuid,
    pub peers: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub sync_interval_secs: u64,
    /// Consecutive health-probe failures before a peer transitions to `unhealthy`.
    pub max_consecutive_failures: u32,
    /// How long deletion tombstones are retained before being purged, in days.
    pub tombstone_retention_days: i64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4(),
            peers: Vec::new(),
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            sync_interval_secs: 30,
            max_consecutive_failures: 3,
            tombstone_retention_days: 30,
        }
    }
}

/// Audit log retention configuration (§4.8).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub retention_days: u32,
    pub cleanup_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            cleanup_interval_secs: 3600,
        }
    }
}

/// Inventory Worker configuration (§4.9): how often the scheduler checks for
/// due inventory configs, not the per-bucket `frequency`/`schedule_time`
/// (those live on each `inventory_configs` row).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryWorkerConfig {
    pub tick_interval_secs: u64,
    /// Objects paged per listing call while enumerating a source bucket.
    pub page_size: i64,
}

impl Default for InventoryWorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            page_size: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.node.name, "ferrostore-node");
        assert_eq!(config.network.s3_listen.port(), 9000);
        assert_eq!(config.multipart.min_part_size, 5 * 1024 * 1024);
    }
}
