//! Append-only audit log (§4.8), stored in its own `audit.db` so a high
//! write volume of audit events never contends with control-plane queries
//! against `metadata.db`.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{MetaError, MetaResult};
use crate::models::AuditEvent;

/// Filter set for `AuditStore::query` (§4.8). `action` doubles as the
/// "event type" filter the spec names separately — the event schema has no
/// dedicated event-type column, and `action` (e.g. `PutObject`,
/// `user_blocked`) already identifies what kind of event occurred.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub tenant_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub action: Option<String>,
    pub status: Option<String>,
    pub resource_type: Option<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditStore {
    pool: SqlitePool,
}

impl AuditStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> MetaResult<()> {
        sqlx::query(
            "INSERT INTO audit_events (id, timestamp, tenant_id, actor_user_id, action, resource_type, resource_id, status, source_ip, user_agent, details_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.timestamp.to_rfc3339())
        .bind(event.tenant_id.map(|id| id.to_string()))
        .bind(event.actor_user_id.map(|id| id.to_string()))
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&event.status)
        .bind(&event.source_ip)
        .bind(&event.user_agent)
        .bind(&event.details_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch events matching every supplied filter, newest first, 1-based
    /// pagination (§4.8): page 1 is the first page, `page_size` is clamped
    /// to `[1, 100]` and defaults to 50 when 0.
    #[allow(clippy::too_many_arguments)]
    pub async fn query(&self, filter: &AuditFilter, page: i64, page_size: i64) -> MetaResult<Vec<AuditEvent>> {
        let page_size = match page_size {
            0 => 50,
            n => n.clamp(1, 100),
        };
        let page = page.max(1);
        let offset = (page - 1) * page_size;

        let mut sql = String::from("SELECT * FROM audit_events WHERE timestamp >= ? AND timestamp < ?");
        if filter.tenant_id.is_some() {
            sql.push_str(" AND tenant_id = ?");
        }
        if filter.actor_user_id.is_some() {
            sql.push_str(" AND actor_user_id = ?");
        }
        if filter.action.is_some() {
            sql.push_str(" AND action = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.resource_type.is_some() {
            sql.push_str(" AND resource_type = ?");
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql).bind(filter.since.to_rfc3339()).bind(filter.until.to_rfc3339());
        if let Some(tid) = filter.tenant_id {
            query = query.bind(tid.to_string());
        }
        if let Some(uid) = filter.actor_user_id {
            query = query.bind(uid.to_string());
        }
        if let Some(action) = &filter.action {
            query = query.bind(action.clone());
        }
        if let Some(status) = &filter.status {
            query = query.bind(status.clone());
        }
        if let Some(resource_type) = &filter.resource_type {
            query = query.bind(resource_type.clone());
        }
        let rows = query.bind(page_size).bind(offset).fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::event_from_row).collect()
    }

    /// Delete events older than `retention_days` (called periodically by a
    /// background worker per §4.8). Returns the number of rows removed.
    pub async fn purge_older_than(&self, retention_days: i64) -> MetaResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM audit_events WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn event_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<AuditEvent> {
        let id: String = row.try_get("id")?;
        let timestamp: String = row.try_get("timestamp")?;
        let tenant_id: Option<String> = row.try_get("tenant_id")?;
        let actor_user_id: Option<String> = row.try_get("actor_user_id")?;

        Ok(AuditEvent {
            id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            tenant_id: tenant_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            actor_user_id: actor_user_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            action: row.try_get("action")?,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            status: row.try_get("status")?,
            source_ip: row.try_get("source_ip")?,
            user_agent: row.try_get("user_agent")?,
            details_json: row.try_get("details_json")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrator::Migrator;
    use crate::schema::audit_migrations;

    async fn test_audit_store() -> AuditStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), audit_migrations()).migrate().await.unwrap();
        AuditStore::new(pool)
    }

    fn sample_event() -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tenant_id: Some(Uuid::new_v4()),
            actor_user_id: Some(Uuid::new_v4()),
            action: "PutObject".into(),
            resource_type: "object".into(),
            resource_id: "my-bucket/a.txt".into(),
            status: "success".into(),
            source_ip: Some("127.0.0.1".into()),
            user_agent: None,
            details_json: None,
        }
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let store = test_audit_store().await;
        let event = sample_event();
        store.append(&event).await.unwrap();

        let filter = AuditFilter {
            tenant_id: event.tenant_id,
            since: Utc::now() - chrono::Duration::minutes(1),
            until: Utc::now() + chrono::Duration::minutes(1),
            ..Default::default()
        };
        let results = store.query(&filter, 1, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, "PutObject");
    }

    #[tokio::test]
    async fn test_query_filters_by_action_and_status() {
        let store = test_audit_store().await;
        let mut denied = sample_event();
        denied.action = "DeleteObject".into();
        denied.status = "denied".into();
        store.append(&denied).await.unwrap();
        store.append(&sample_event()).await.unwrap();

        let filter = AuditFilter {
            action: Some("DeleteObject".into()),
            status: Some("denied".into()),
            since: Utc::now() - chrono::Duration::minutes(1),
            until: Utc::now() + chrono::Duration::minutes(1),
            ..Default::default()
        };
        let results = store.query(&filter, 1, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resource_id, denied.resource_id);
    }

    #[tokio::test]
    async fn test_query_pagination_is_one_based() {
        let store = test_audit_store().await;
        for _ in 0..5 {
            store.append(&sample_event()).await.unwrap();
        }

        let filter = AuditFilter { since: Utc::now() - chrono::Duration::minutes(1), until: Utc::now() + chrono::Duration::minutes(1), ..Default::default() };
        let page1 = store.query(&filter, 1, 2).await.unwrap();
        let page2 = store.query(&filter, 2, 2).await.unwrap();
        let page3 = store.query(&filter, 3, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_eq!(page3.len(), 1);
        assert_ne!(page1[0].id, page2[0].id);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = test_audit_store().await;
        let mut old = sample_event();
        old.timestamp = Utc::now() - chrono::Duration::days(200);
        store.append(&old).await.unwrap();
        store.append(&sample_event()).await.unwrap();

        let purged = store.purge_older_than(90).await.unwrap();
        assert_eq!(purged, 1);
    }
}
