//! Inventory Worker (§4.9): on a tick, finds due `inventory_configs` rows and
//! renders each source bucket's current object listing into the configured
//! destination bucket, tracking one `inventory_reports` row per attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ferrostore_common::config::InventoryWorkerConfig;
use ferrostore_common::path::PathSandbox;
use ferrostore_meta::models::{InventoryConfig, InventoryFormat, ObjectRecord};
use ferrostore_meta::MetaStore;
use ferrostore_storage::FilesystemBackend;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::render::render;
use crate::schedule::{next_run_at, parse_schedule_time};

pub struct InventoryWorker {
    meta: Arc<MetaStore>,
    storage: Arc<FilesystemBackend>,
    sandbox: PathSandbox,
    config: InventoryWorkerConfig,
}

impl InventoryWorker {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>, storage: Arc<FilesystemBackend>, sandbox: PathSandbox, config: InventoryWorkerConfig) -> Self {
        Self { meta, storage, sandbox, config }
    }

    /// Spawn the tick loop, stopped by `token`. Runs once immediately on
    /// startup (so a config due while the gateway was down fires right
    /// away), then every `config.tick_interval_secs`.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.tick_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::info!("inventory worker shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        self.run_tick().await;
                    }
                }
            }
        })
    }

    /// Process every config whose `next_run_at` has passed.
    pub async fn run_tick(&self) {
        let due = match self.meta.list_due_inventory_configs(Utc::now()).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list due inventory configs");
                return;
            }
        };
        for config in due {
            self.process_one(&config).await;
        }
    }

    async fn process_one(&self, config: &InventoryConfig) {
        let report = match self.meta.create_inventory_report(config.id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(config_id = %config.id, error = %e, "failed to create inventory report row");
                return;
            }
        };

        let result = self.run_config(config, report.id).await;

        let now = Utc::now();
        let scheduled_time = match parse_schedule_time(&config.schedule_time) {
            Ok(time) => time,
            Err(e) => {
                tracing::error!(config_id = %config.id, error = %e, "invalid schedule_time, disabling config");
                let _ = self.meta.set_inventory_config_enabled(config.id, false).await;
                return;
            }
        };
        let next = next_run_at(now, config.frequency, scheduled_time);

        match result {
            Ok(written) => {
                if let Err(e) = self.meta.complete_inventory_report(report.id, written.object_count, &written.report_key).await {
                    tracing::error!(report_id = %report.id, error = %e, "failed to mark inventory report completed");
                }
                tracing::info!(config_id = %config.id, objects = written.object_count, key = %written.report_key, "inventory report generated");
            }
            Err(e) => {
                if let Err(mark_err) = self.meta.fail_inventory_report(report.id, &e.to_string()).await {
                    tracing::error!(report_id = %report.id, error = %mark_err, "failed to mark inventory report failed");
                }
                tracing::warn!(config_id = %config.id, error = %e, "inventory report failed");
            }
        }

        if let Err(e) = self.meta.record_inventory_run(config.id, now, next).await {
            tracing::error!(config_id = %config.id, error = %e, "failed to update inventory config schedule");
        }
    }

    async fn run_config(&self, config: &InventoryConfig, report_id: Uuid) -> InventoryResult<WrittenReport> {
        let source = self
            .meta
            .get_bucket_by_id(config.bucket_id)
            .await?
            .ok_or_else(|| InventoryError::SourceMissing(config.bucket_id.to_string()))?;
        let destination = self
            .meta
            .get_bucket(&config.destination_bucket)
            .await?
            .ok_or_else(|| InventoryError::DestinationMissing(config.destination_bucket.clone()))?;
        if source.id == destination.id {
            return Err(InventoryError::CircularReference(source.name.clone()));
        }

        let mut records: Vec<ObjectRecord> = Vec::new();
        let mut marker = String::new();
        loop {
            let page = self.meta.list_objects(source.id, "", self.config.page_size, &marker).await?;
            if page.is_empty() {
                break;
            }
            marker = page.last().map(|r| r.key.clone()).unwrap_or_default();
            let exhausted = (page.len() as i64) < self.config.page_size;
            records.extend(page);
            if exhausted {
                break;
            }
        }
        let object_count = records.len() as i64;

        let (body, content_type) = render(&records, config.format)?;
        let extension = match config.format {
            InventoryFormat::Csv => "csv",
            InventoryFormat::Json => "json",
        };
        let report_key = format!("{}{report_id}.{extension}", config.destination_prefix);

        let tenant_id = destination.tenant_id.to_string();
        let path = self.sandbox.object_path(&tenant_id, &destination.name, &report_key)?;
        let metadata = self.storage.put(&path, false, body.as_slice(), Some(content_type), std::collections::HashMap::new()).await?;

        let existing = self.meta.get_latest_object(destination.id, &report_key).await?;
        let record = ObjectRecord {
            bucket_id: destination.id,
            key: report_key.clone(),
            version_id: "null".to_string(),
            is_latest: true,
            is_delete_marker: false,
            size: metadata.size as i64,
            etag: metadata.etag,
            content_type: content_type.to_string(),
            storage_class: "STANDARD".to_string(),
            metadata_json: "{}".to_string(),
            tags_json: None,
            retention_mode: None,
            retain_until: None,
            legal_hold: false,
            last_modified: metadata.last_modified,
        };
        let byte_delta = record.size - existing.as_ref().map_or(0, |o| o.size);
        let object_delta = i64::from(existing.is_none());
        self.meta.put_object(destination.id, &record).await?;
        let _ = self.meta.adjust_bucket_counters(&destination.name, object_delta, byte_delta).await;

        Ok(WrittenReport { object_count, report_key })
    }
}

struct WrittenReport {
    object_count: i64,
    report_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_meta::models::{InventoryFormat, InventoryFrequency, InventoryReportStatus, ObjectRecord};
    use ferrostore_meta::Migrator;
    use sqlx::SqlitePool;
    use tempfile::tempdir;

    async fn test_worker() -> (Arc<InventoryWorker>, Arc<MetaStore>, tempfile::TempDir) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), ferrostore_meta::schema::metadata_migrations()).migrate().await.unwrap();
        let meta = Arc::new(MetaStore::new(pool));
        let dir = tempdir().unwrap();
        let storage = Arc::new(FilesystemBackend::new(dir.path()));
        let sandbox = PathSandbox::new(dir.path());
        let worker = Arc::new(InventoryWorker::new(Arc::clone(&meta), storage, sandbox, InventoryWorkerConfig::default()));
        (worker, meta, dir)
    }

    #[tokio::test]
    async fn test_process_one_writes_csv_report_and_reschedules() {
        let (worker, meta, _dir) = test_worker().await;
        let tenant = meta.create_tenant("acme").await.unwrap();
        let user_id = meta.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let source = meta.create_bucket(tenant.id, "source-bucket", user_id).await.unwrap();
        meta.create_bucket(tenant.id, "dest-bucket", user_id).await.unwrap();

        meta.put_object(
            source.id,
            &ObjectRecord {
                bucket_id: source.id,
                key: "a.txt".into(),
                version_id: "null".into(),
                is_latest: true,
                is_delete_marker: false,
                size: 10,
                etag: "e1".into(),
                content_type: "text/plain".into(),
                storage_class: "STANDARD".into(),
                metadata_json: "{}".into(),
                tags_json: None,
                retention_mode: None,
                retain_until: None,
                legal_hold: false,
                last_modified: Utc::now(),
            },
        )
        .await
        .unwrap();

        let config = meta
            .create_inventory_config(source.id, "dest-bucket", "inventory/", InventoryFormat::Csv, InventoryFrequency::Daily, "00:00", Utc::now())
            .await
            .unwrap();

        worker.process_one(&config).await;

        let reports = meta.list_inventory_reports_for_config(config.id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, InventoryReportStatus::Completed);
        assert_eq!(reports[0].object_count, 1);
        let report_key = reports[0].report_key.clone().unwrap();
        assert!(report_key.starts_with("inventory/"));

        let written = meta.get_latest_object(meta.get_bucket("dest-bucket").await.unwrap().unwrap().id, &report_key).await.unwrap();
        assert!(written.is_some());

        let updated = meta.get_inventory_config(config.id).await.unwrap().unwrap();
        assert!(updated.last_run_at.is_some());
        assert!(updated.next_run_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_process_one_rejects_circular_reference() {
        let (worker, meta, _dir) = test_worker().await;
        let tenant = meta.create_tenant("acme").await.unwrap();
        let user_id = meta.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = meta.create_bucket(tenant.id, "only-bucket", user_id).await.unwrap();

        let config = meta
            .create_inventory_config(bucket.id, "only-bucket", "", InventoryFormat::Json, InventoryFrequency::Daily, "00:00", Utc::now())
            .await
            .unwrap();

        worker.process_one(&config).await;

        let reports = meta.list_inventory_reports_for_config(config.id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, InventoryReportStatus::Failed);
        assert!(reports[0].error.as_deref().unwrap().contains("same"));
    }

    #[tokio::test]
    async fn test_process_one_fails_cleanly_when_destination_missing() {
        let (worker, meta, _dir) = test_worker().await;
        let tenant = meta.create_tenant("acme").await.unwrap();
        let user_id = meta.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let source = meta.create_bucket(tenant.id, "source-bucket", user_id).await.unwrap();

        let config = meta
            .create_inventory_config(source.id, "missing-bucket", "", InventoryFormat::Csv, InventoryFrequency::Weekly, "12:00", Utc::now())
            .await
            .unwrap();

        worker.process_one(&config).await;

        let reports = meta.list_inventory_reports_for_config(config.id).await.unwrap();
        assert_eq!(reports[0].status, InventoryReportStatus::Failed);
    }
}
