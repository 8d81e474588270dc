//! Peer registry and bucket-listing fan-out (§4.11).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ferrostore_meta::models::ClusterNode;
use ferrostore_meta::MetaStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClusterError, ClusterResult};

/// The subset of a `Bucket` that peers exchange when aggregating a
/// cluster-wide bucket listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub struct PeerRegistry {
    meta: Arc<MetaStore>,
    client: reqwest::Client,
    local_node_id: Uuid,
    fanout_timeout: Duration,
}

impl PeerRegistry {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>, local_node_id: Uuid, fanout_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fanout_timeout)
            .build()
            .expect("reqwest client with static TLS config always builds");
        Self { meta, client, local_node_id, fanout_timeout }
    }

    pub async fn register_peer(&self, endpoint: impl Into<String>, shared_token: impl Into<String>, region: impl Into<String>, priority: i32) -> ClusterResult<ClusterNode> {
        let node = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: endpoint.into(),
            shared_token: shared_token.into(),
            region: region.into(),
            priority,
            health: ferrostore_meta::models::NodeHealth::Unknown,
            last_health_check: None,
            capacity_bytes: None,
        };
        self.meta.register_cluster_node(&node).await?;
        Ok(node)
    }

    /// All registered peers excluding the local node.
    pub async fn list_remote_peers(&self) -> ClusterResult<Vec<ClusterNode>> {
        Ok(self
            .meta
            .list_cluster_nodes()
            .await?
            .into_iter()
            .filter(|n| n.id != self.local_node_id)
            .collect())
    }

    /// Merge `local` with every peer's bucket listing for `tenant_id`,
    /// deduplicating by (tenant, name). A peer that times out or errors
    /// contributes nothing; the aggregate degrades to local-only results
    /// rather than failing the whole request.
    pub async fn aggregate_bucket_listing(&self, tenant_id: Uuid, local: Vec<BucketSummary>) -> ClusterResult<Vec<BucketSummary>> {
        let peers = self.list_remote_peers().await?;
        let mut fetches = Vec::with_capacity(peers.len());
        for peer in peers {
            let client = self.client.clone();
            let timeout = self.fanout_timeout;
            fetches.push(tokio::spawn(async move { fetch_peer_buckets(&client, &peer, tenant_id, timeout).await }));
        }

        let mut merged = local;
        for result in futures::future::join_all(fetches).await {
            match result {
                Ok(Ok(buckets)) => merged.extend(buckets),
                Ok(Err(e)) => tracing::warn!(error = %e, "peer bucket listing fan-out failed, degrading to partial results"),
                Err(e) => tracing::warn!(error = %e, "peer bucket listing task panicked"),
            }
        }

        merged.sort_by(|a, b| (a.tenant_id, &a.name).cmp(&(b.tenant_id, &b.name)));
        merged.dedup_by(|a, b| a.tenant_id == b.tenant_id && a.name == b.name);
        Ok(merged)
    }
}

async fn fetch_peer_buckets(client: &reqwest::Client, peer: &ClusterNode, tenant_id: Uuid, timeout: Duration) -> ClusterResult<Vec<BucketSummary>> {
    let url = format!("{}/cluster/buckets?tenant_id={tenant_id}", peer.endpoint.trim_end_matches('/'));
    let request = client.get(url).header("x-ferrostore-cluster-token", &peer.shared_token).send();
    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| ClusterError::Transport(format!("peer {} timed out", peer.id)))?
        .map_err(|e| ClusterError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ClusterError::Peer(peer.id));
    }
    response.json().await.map_err(|e| ClusterError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_meta::schema::metadata_migrations;
    use ferrostore_meta::Migrator;
    use sqlx::SqlitePool;

    async fn test_registry() -> PeerRegistry {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), metadata_migrations()).migrate().await.unwrap();
        let meta = Arc::new(MetaStore::new(pool));
        PeerRegistry::new(meta, Uuid::new_v4(), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_register_and_list_excludes_nothing_but_local() {
        let registry = test_registry().await;
        let peer = registry.register_peer("https://peer.internal", "tok", "us-west-2", 1).await.unwrap();
        let peers = registry.list_remote_peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, peer.id);
    }

    #[tokio::test]
    async fn test_aggregate_with_no_peers_returns_local_unchanged() {
        let registry = test_registry().await;
        let tenant_id = Uuid::new_v4();
        let local = vec![BucketSummary { tenant_id, name: "my-bucket".into(), created_at: Utc::now() }];
        let aggregated = registry.aggregate_bucket_listing(tenant_id, local.clone()).await.unwrap();
        assert_eq!(aggregated, local);
    }

    #[tokio::test]
    async fn test_aggregate_degrades_to_local_when_peer_unreachable() {
        let registry = test_registry().await;
        registry.register_peer("http://127.0.0.1:1", "tok", "us-west-2", 0).await.unwrap();
        let tenant_id = Uuid::new_v4();
        let local = vec![BucketSummary { tenant_id, name: "my-bucket".into(), created_at: Utc::now() }];
        let aggregated = registry.aggregate_bucket_listing(tenant_id, local.clone()).await.unwrap();
        assert_eq!(aggregated, local);
    }
}
