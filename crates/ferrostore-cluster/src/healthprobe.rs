//! Peer health probing (§4.11): periodically calls each peer's health
//! endpoint with shared-token auth and transitions a node's recorded
//! `NodeHealth` after a configurable run of consecutive failures.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ferrostore_meta::models::NodeHealth;
use ferrostore_meta::MetaStore;
use uuid::Uuid;

use crate::error::ClusterResult;

/// Tracks consecutive probe failures per peer in memory; the durable
/// `NodeHealth` column only moves once the run crosses `max_consecutive_failures`,
/// so a single blip doesn't flap the cluster's view of a peer.
pub struct HealthProber {
    client: reqwest::Client,
    meta: Arc<MetaStore>,
    max_consecutive_failures: u32,
    failure_counts: DashMap<Uuid, u32>,
}

impl HealthProber {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>, max_consecutive_failures: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client with static TLS config always builds");
        Self { client, meta, max_consecutive_failures, failure_counts: DashMap::new() }
    }

    /// Probe every registered peer once and persist any resulting health transition.
    pub async fn probe_all(&self) -> ClusterResult<()> {
        for node in self.meta.list_cluster_nodes().await? {
            let healthy = self.probe_one(&node.endpoint, &node.shared_token).await;
            self.record_result(node.id, healthy).await?;
        }
        Ok(())
    }

    async fn probe_one(&self, endpoint: &str, shared_token: &str) -> bool {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        match self.client.get(url).header("x-ferrostore-cluster-token", shared_token).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(endpoint, error = %e, "cluster health probe failed");
                false
            }
        }
    }

    async fn record_result(&self, node_id: Uuid, healthy: bool) -> ClusterResult<()> {
        if healthy {
            self.failure_counts.remove(&node_id);
            self.meta.update_node_health(node_id, NodeHealth::Healthy).await?;
            return Ok(());
        }

        let mut failures = self.failure_counts.entry(node_id).or_insert(0);
        *failures += 1;

        let health = if *failures >= self.max_consecutive_failures {
            NodeHealth::Unhealthy
        } else {
            NodeHealth::Degraded
        };
        drop(failures);
        self.meta.update_node_health(node_id, health).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_meta::models::ClusterNode;
    use ferrostore_meta::schema::metadata_migrations;
    use ferrostore_meta::Migrator;
    use sqlx::SqlitePool;

    async fn test_store() -> Arc<MetaStore> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), metadata_migrations()).migrate().await.unwrap();
        Arc::new(MetaStore::new(pool))
    }

    #[tokio::test]
    async fn test_failure_transitions_to_degraded_then_unhealthy() {
        let meta = test_store().await;
        let node = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: "http://127.0.0.1:1".into(),
            shared_token: "tok".into(),
            region: "us-east-1".into(),
            priority: 0,
            health: NodeHealth::Unknown,
            last_health_check: None,
            capacity_bytes: None,
        };
        meta.register_cluster_node(&node).await.unwrap();

        let prober = HealthProber::new(Arc::clone(&meta), 3);
        prober.record_result(node.id, false).await.unwrap();
        let fetched = meta.get_cluster_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.health, NodeHealth::Degraded);

        prober.record_result(node.id, false).await.unwrap();
        prober.record_result(node.id, false).await.unwrap();
        let fetched = meta.get_cluster_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.health, NodeHealth::Unhealthy);

        prober.record_result(node.id, true).await.unwrap();
        let fetched = meta.get_cluster_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.health, NodeHealth::Healthy);
    }
}
