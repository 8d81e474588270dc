//! Entity sync and deletion tombstones (§4.11).
//!
//! On a tenant/user/access-key/bucket-permission change, [`SyncCoordinator::enqueue`]
//! writes one `sync_rows` row per peer with a checksum of the entity's
//! canonical serialization; [`SyncCoordinator::push_pending`] is the worker
//! loop that keeps retrying a peer until it acknowledges the same checksum.

use std::sync::Arc;
use std::time::Duration;

use ferrostore_meta::models::ClusterNode;
use ferrostore_meta::MetaStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::canonical_checksum;
use crate::error::ClusterResult;

pub struct SyncCoordinator {
    client: reqwest::Client,
    meta: Arc<MetaStore>,
    local_node_id: Uuid,
}

#[derive(Serialize)]
struct SyncPushRequest<'a> {
    entity_id: &'a str,
    checksum: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct SyncAckResponse {
    checksum: String,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>, local_node_id: Uuid) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client with static TLS config always builds");
        Self { client, meta, local_node_id }
    }

    /// Record that `entity_id`'s current state (`entity`, any `Serialize`
    /// syncable-fields snapshot) needs to reach every other registered peer.
    /// Called after a tenant/user/access-key/bucket-permission write commits.
    pub async fn enqueue<T: Serialize>(&self, entity_id: &str, entity: &T) -> ClusterResult<()> {
        let checksum = canonical_checksum(entity)?;
        for peer in self.meta.list_cluster_nodes().await? {
            if peer.id == self.local_node_id {
                continue;
            }
            self.meta.upsert_sync_row(entity_id, peer.id, &checksum).await?;
        }
        Ok(())
    }

    /// Push every row still unacknowledged by `peer`, acknowledging locally
    /// as soon as the peer confirms the same checksum. Individual row
    /// failures are logged and left pending for the next sync tick.
    pub async fn push_pending(&self, peer: &ClusterNode, payload_for: impl Fn(&str) -> Option<serde_json::Value>) -> ClusterResult<()> {
        let rows = self.meta.list_unacknowledged_sync_rows(peer.id).await?;
        for row in rows {
            let Some(payload) = payload_for(&row.entity_id) else {
                tracing::warn!(entity_id = %row.entity_id, "sync row has no resolvable entity, skipping this tick");
                continue;
            };
            match self.push_one(peer, &row.entity_id, &row.checksum, &payload).await {
                Ok(true) => {
                    self.meta.acknowledge_sync_row(&row.entity_id, peer.id).await?;
                }
                Ok(false) => {
                    tracing::warn!(peer = %peer.id, entity_id = %row.entity_id, "peer acked a different checksum, will retry");
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.id, entity_id = %row.entity_id, error = %e, "sync push failed, will retry");
                }
            }
        }
        Ok(())
    }

    async fn push_one(&self, peer: &ClusterNode, entity_id: &str, checksum: &str, payload: &serde_json::Value) -> ClusterResult<bool> {
        let url = format!("{}/cluster/sync/{entity_id}", peer.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .put(url)
            .header("x-ferrostore-cluster-token", &peer.shared_token)
            .json(&SyncPushRequest { entity_id, checksum, payload })
            .send()
            .await
            .map_err(|e| crate::error::ClusterError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(crate::error::ClusterError::Peer(peer.id));
        }
        let ack: SyncAckResponse = response.json().await.map_err(|e| crate::error::ClusterError::Transport(e.to_string()))?;
        Ok(ack.checksum == checksum)
    }

    /// Record a local entity deletion as a tombstone peers will pull.
    pub async fn record_deletion(&self, entity_type: &str, entity_id: &str) -> ClusterResult<()> {
        self.meta.record_tombstone(entity_type, entity_id, self.local_node_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_meta::models::NodeHealth;
    use ferrostore_meta::schema::metadata_migrations;
    use ferrostore_meta::Migrator;
    use sqlx::SqlitePool;

    async fn test_coordinator() -> (SyncCoordinator, Arc<MetaStore>, Uuid) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), metadata_migrations()).migrate().await.unwrap();
        let meta = Arc::new(MetaStore::new(pool));
        let local = Uuid::new_v4();
        (SyncCoordinator::new(Arc::clone(&meta), local), meta, local)
    }

    #[tokio::test]
    async fn test_enqueue_writes_one_row_per_remote_peer_skipping_local() {
        let (coordinator, meta, local) = test_coordinator().await;
        let local_node = ClusterNode {
            id: local,
            endpoint: "https://self.internal".into(),
            shared_token: "tok".into(),
            region: "us-east-1".into(),
            priority: 0,
            health: NodeHealth::Healthy,
            last_health_check: None,
            capacity_bytes: None,
        };
        let remote = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: "https://peer.internal".into(),
            shared_token: "tok2".into(),
            region: "us-west-2".into(),
            priority: 0,
            health: NodeHealth::Healthy,
            last_health_check: None,
            capacity_bytes: None,
        };
        meta.register_cluster_node(&local_node).await.unwrap();
        meta.register_cluster_node(&remote).await.unwrap();

        coordinator.enqueue("tenant:acme", &serde_json::json!({"name": "acme"})).await.unwrap();

        assert!(meta.list_unacknowledged_sync_rows(local).await.unwrap().is_empty());
        let remote_rows = meta.list_unacknowledged_sync_rows(remote.id).await.unwrap();
        assert_eq!(remote_rows.len(), 1);
        assert_eq!(remote_rows[0].entity_id, "tenant:acme");
    }

    #[tokio::test]
    async fn test_record_deletion_writes_tombstone_attributed_to_local_node() {
        let (coordinator, meta, local) = test_coordinator().await;
        coordinator.record_deletion("bucket", "my-bucket").await.unwrap();
        let tombstones = meta.list_tombstones_since(chrono::Utc::now() - chrono::Duration::seconds(5)).await.unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].deleted_by_node, local);
    }
}
