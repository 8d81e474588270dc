//! Replication dispatcher (§4.10): a fixed-size worker pool that claims due
//! `pending` work items, executes them against the rule's destination, and
//! resolves conflicts / retries according to the rule's policy.

use std::sync::Arc;
use std::time::Duration;

use ferrostore_common::config::ReplicationConfig;
use ferrostore_common::PathSandbox;
use ferrostore_meta::models::{ConflictResolution, ReplicationOp, ReplicationRule};
use ferrostore_meta::MetaStore;
use ferrostore_storage::FilesystemBackend;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backoff::next_retry_at;
use crate::error::{ReplicationError, ReplicationResult};
use crate::executor::{ClusterExecutor, ExternalS3Executor, ReplicationExecutor, ReplicationObject};

pub struct ReplicationDispatcher {
    meta: Arc<MetaStore>,
    storage: Arc<FilesystemBackend>,
    sandbox: PathSandbox,
    config: ReplicationConfig,
}

impl ReplicationDispatcher {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>, storage: Arc<FilesystemBackend>, sandbox: PathSandbox, config: ReplicationConfig) -> Self {
        Self { meta, storage, sandbox, config }
    }

    /// Enqueue replication work for a completed mutation on `bucket`, one
    /// item per enabled rule whose `prefix_filter` matches `key` (ingest side
    /// of §4.10). Best-effort: a rule lookup failure never fails the caller's
    /// request, it only skips that rule.
    pub async fn enqueue_for_mutation(&self, tenant_id: Uuid, bucket: &str, key: &str, version_id: &str, op: ReplicationOp) {
        let rules = match self.meta.list_replication_rules_for_bucket(tenant_id, bucket).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(bucket, error = %e, "failed to load replication rules for mutation");
                return;
            }
        };

        for rule in rules {
            if let Some(prefix) = &rule.prefix_filter {
                if !key.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if op == ReplicationOp::Delete && !rule.replicate_deletes {
                continue;
            }
            if let Err(e) = self.meta.enqueue_replication_work_item(rule.id, key, version_id, op).await {
                tracing::warn!(bucket, key, rule_id = %rule.id, error = %e, "failed to enqueue replication work item");
            }
        }
    }

    /// Spawn `config.worker_count` claim/execute loops, all stopped by `token`.
    pub fn spawn_workers(self: Arc<Self>, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count.max(1))
            .map(|worker_id| {
                let dispatcher = Arc::clone(&self);
                let token = token.clone();
                tokio::spawn(async move { dispatcher.run_worker(worker_id, token).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::info!(worker_id, "replication worker shutting down");
                    return;
                }
                claimed = self.meta.claim_replication_work_items(1) => {
                    match claimed {
                        Ok(ids) if !ids.is_empty() => {
                            for id in ids {
                                self.process_one(id).await;
                            }
                        }
                        Ok(_) => tokio::time::sleep(Duration::from_millis(500)).await,
                        Err(e) => {
                            tracing::warn!(worker_id, error = %e, "failed to claim replication work items");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn process_one(&self, id: Uuid) {
        match self.execute(id).await {
            Ok(()) => {
                if let Err(e) = self.meta.complete_replication_work_item(id).await {
                    tracing::error!(work_item = %id, error = %e, "failed to mark replication work item completed");
                }
            }
            Err(e) => {
                tracing::warn!(work_item = %id, error = %e, "replication attempt failed");
                let max_attempts = i32::try_from(self.config.max_retries).unwrap_or(i32::MAX);
                let retry_at = next_retry_at(1, self.config.initial_backoff_secs, self.config.max_backoff_secs);
                if let Err(e) = self
                    .meta
                    .fail_replication_work_item(id, max_attempts, retry_at, &e.to_string())
                    .await
                {
                    tracing::error!(work_item = %id, error = %e, "failed to record replication failure");
                }
            }
        }
    }

    async fn execute(&self, id: Uuid) -> ReplicationResult<()> {
        let item = self
            .meta
            .get_replication_work_item(id)
            .await?
            .ok_or_else(|| ReplicationError::Internal(format!("claimed work item {id} vanished")))?;
        let rule = self
            .meta
            .get_replication_rule(item.rule_id)
            .await?
            .ok_or_else(|| ReplicationError::Internal(format!("rule {} for work item {id} no longer exists", item.rule_id)))?;

        let executor = build_executor(self, &rule).await?;

        match item.op {
            ReplicationOp::Delete => {
                executor.delete_object(&rule.destination_bucket, &item.object_key).await?;
                self.meta
                    .record_replication_success(rule.id, &item.object_key, &item.version_id, "", 0)
                    .await?;
            }
            ReplicationOp::Put | ReplicationOp::Metadata => {
                self.replicate_put(&rule, &item.object_key, &item.version_id, executor.as_ref()).await?;
            }
        }
        Ok(())
    }

    async fn replicate_put(
        &self,
        rule: &ReplicationRule,
        key: &str,
        version_id: &str,
        executor: &dyn ReplicationExecutor,
    ) -> ReplicationResult<()> {
        let bucket = self
            .meta
            .get_bucket(&rule.source_bucket)
            .await?
            .ok_or_else(|| ReplicationError::SourceMissing { bucket: rule.source_bucket.clone(), key: key.to_string() })?;
        let record = self
            .meta
            .get_object_version(bucket.id, key, version_id)
            .await?
            .ok_or_else(|| ReplicationError::SourceMissing { bucket: rule.source_bucket.clone(), key: key.to_string() })?;

        if rule.conflict_resolution == ConflictResolution::LastWriteWins {
            if let Some(dest_modified) = executor.head_object(&rule.destination_bucket, key).await? {
                if dest_modified >= record.last_modified {
                    tracing::debug!(key, "destination copy is newer, skipping replication (last_write_wins)");
                    return self
                        .meta
                        .record_replication_success(rule.id, key, version_id, &record.etag, record.size)
                        .await
                        .map_err(Into::into);
                }
            }
        }

        let path = self.sandbox.object_path(&bucket.tenant_id.to_string(), &rule.source_bucket, key)?;
        let (mut file, _) = self.storage.get(&path).await?;
        let mut body = Vec::with_capacity(usize::try_from(record.size).unwrap_or(0));
        file.read_to_end(&mut body).await.map_err(|e| ReplicationError::Storage(e.into()))?;

        let metadata: std::collections::HashMap<String, String> =
            serde_json::from_str(&record.metadata_json).unwrap_or_default();
        let object = ReplicationObject {
            key: key.to_string(),
            etag: record.etag.clone(),
            content_type: record.content_type.clone(),
            metadata,
            last_modified: record.last_modified,
        };

        executor.put_object(&rule.destination_bucket, &object, body).await?;
        self.meta
            .record_replication_success(rule.id, key, version_id, &record.etag, record.size)
            .await?;
        Ok(())
    }
}

async fn build_executor(dispatcher: &ReplicationDispatcher, rule: &ReplicationRule) -> ReplicationResult<Box<dyn ReplicationExecutor>> {
    if let Some(endpoint) = &rule.destination_external_endpoint {
        let access_key = rule.destination_external_access_key.as_deref().unwrap_or_default();
        let secret_key = rule.destination_external_secret_key.as_deref().unwrap_or_default();
        return Ok(Box::new(ExternalS3Executor::new(endpoint, access_key, secret_key, "us-east-1")));
    }
    if let Some(node_id) = rule.destination_node_id {
        let node = dispatcher
            .meta
            .get_cluster_node(node_id)
            .await?
            .ok_or_else(|| ReplicationError::Internal(format!("destination node {node_id} not registered")))?;
        return Ok(Box::new(ClusterExecutor::new(node.endpoint, node.shared_token)));
    }
    Err(ReplicationError::NoDestination(rule.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_common::config::ReplicationConfig as Cfg;
    use ferrostore_meta::models::{ClusterNode, NodeHealth};
    use ferrostore_meta::Migrator;
    use sqlx::SqlitePool;
    use tempfile::tempdir;

    async fn test_dispatcher() -> (ReplicationDispatcher, tempfile::TempDir) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), ferrostore_meta::schema::metadata_migrations()).migrate().await.unwrap();
        let meta = Arc::new(MetaStore::new(pool));
        let dir = tempdir().unwrap();
        let storage = Arc::new(FilesystemBackend::new(dir.path()));
        let sandbox = PathSandbox::new(dir.path());
        (ReplicationDispatcher::new(meta, storage, sandbox, Cfg::default()), dir)
    }

    #[tokio::test]
    async fn test_enqueue_for_mutation_respects_prefix_filter() {
        let (dispatcher, _dir) = test_dispatcher().await;
        let tenant = dispatcher.meta.create_tenant("acme").await.unwrap();
        let user_id = dispatcher.meta.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        dispatcher.meta.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();

        let rule = ReplicationRule {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            source_bucket: "my-bucket".into(),
            destination_external_endpoint: Some("https://dest.example.com".into()),
            destination_external_access_key: Some("AKID".into()),
            destination_external_secret_key: Some("secret".into()),
            destination_node_id: None,
            destination_bucket: "my-bucket-replica".into(),
            prefix_filter: Some("photos/".into()),
            mode: ferrostore_meta::models::ReplicationMode::Realtime,
            conflict_resolution: ConflictResolution::LastWriteWins,
            replicate_deletes: true,
            replicate_metadata: true,
            priority: 0,
            enabled: true,
        };
        dispatcher.meta.create_replication_rule(&rule).await.unwrap();

        dispatcher.enqueue_for_mutation(tenant.id, "my-bucket", "photos/a.jpg", "v1", ReplicationOp::Put).await;
        dispatcher.enqueue_for_mutation(tenant.id, "my-bucket", "docs/a.txt", "v1", ReplicationOp::Put).await;

        let claimed = dispatcher.meta.claim_replication_work_items(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        let item = dispatcher.meta.get_replication_work_item(claimed[0]).await.unwrap().unwrap();
        assert_eq!(item.object_key, "photos/a.jpg");
    }

    #[tokio::test]
    async fn test_build_executor_prefers_external_over_cluster() {
        let (dispatcher, _dir) = test_dispatcher().await;
        let tenant = dispatcher.meta.create_tenant("acme").await.unwrap();
        let node = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: "https://peer.internal:9000".into(),
            shared_token: "tok".into(),
            region: "us-east-1".into(),
            priority: 0,
            health: NodeHealth::Healthy,
            last_health_check: None,
            capacity_bytes: None,
        };
        dispatcher.meta.register_cluster_node(&node).await.unwrap();

        let rule = ReplicationRule {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            source_bucket: "b".into(),
            destination_external_endpoint: Some("https://dest.example.com".into()),
            destination_external_access_key: Some("AKID".into()),
            destination_external_secret_key: Some("secret".into()),
            destination_node_id: Some(node.id),
            destination_bucket: "b2".into(),
            prefix_filter: None,
            mode: ferrostore_meta::models::ReplicationMode::Realtime,
            conflict_resolution: ConflictResolution::SourceWins,
            replicate_deletes: true,
            replicate_metadata: true,
            priority: 0,
            enabled: true,
        };
        // Both an external endpoint and a cluster node are configured; the
        // external destination takes precedence, so no lookup of `node` is
        // needed and building the executor must not fail.
        build_executor(&dispatcher, &rule).await.unwrap();
    }

    #[tokio::test]
    async fn test_build_executor_with_no_destination_errs() {
        let (dispatcher, _dir) = test_dispatcher().await;
        let tenant = dispatcher.meta.create_tenant("acme").await.unwrap();
        let rule = ReplicationRule {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            source_bucket: "b".into(),
            destination_external_endpoint: None,
            destination_external_access_key: None,
            destination_external_secret_key: None,
            destination_node_id: None,
            destination_bucket: "b2".into(),
            prefix_filter: None,
            mode: ferrostore_meta::models::ReplicationMode::Realtime,
            conflict_resolution: ConflictResolution::SourceWins,
            replicate_deletes: true,
            replicate_metadata: true,
            priority: 0,
            enabled: true,
        };
        let err = build_executor(&dispatcher, &rule).await.unwrap_err();
        assert!(matches!(err, ReplicationError::NoDestination(id) if id == rule.id));
    }
}
