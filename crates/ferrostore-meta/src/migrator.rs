//! Versioned, transactional, forward-only schema migrator (§4.3/§4.12).
//!
//! Not `sqlx::migrate!` — `MigrateTo(v)`/`History`/refuse-on-downgrade are
//! more than the macro gives you, so migrations are a plain in-memory table
//! applied by hand, one transaction per step.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{MetaError, MetaResult};

/// A single forward migration. `down` is not executed; it documents intent.
#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
}

/// A row of applied-migration history.
#[derive(Clone, Debug)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

pub struct Migrator {
    pool: SqlitePool,
    migrations: Vec<Migration>,
}

impl Migrator {
    #[must_use]
    pub fn new(pool: SqlitePool, migrations: Vec<Migration>) -> Self {
        let mut migrations = migrations;
        migrations.sort_by_key(|m| m.version);
        Self { pool, migrations }
    }

    /// Create the `schema_version` bookkeeping table if it does not exist.
    pub async fn initialize(&self) -> MetaResult<()> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS schema_version (
                version     INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at  TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Highest applied version, or 0 if nothing has been applied.
    pub async fn current_version(&self) -> MetaResult<i64> {
        self.initialize().await?;
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("version")?)
    }

    /// Highest version known to this binary's compiled migration list.
    #[must_use]
    pub fn target_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Run every migration above the current version, in order.
    pub async fn migrate(&self) -> MetaResult<()> {
        self.migrate_to(self.target_version()).await
    }

    /// Run migrations up to (and including) `target`. Refuses if the store
    /// is already ahead of `target` ("downgrade detected").
    pub async fn migrate_to(&self, target: i64) -> MetaResult<()> {
        let current = self.current_version().await?;
        if current > target {
            return Err(MetaError::DowngradeDetected { current, target });
        }

        for migration in &self.migrations {
            if migration.version <= current || migration.version > target {
                continue;
            }

            tracing::info!(version = migration.version, description = migration.description, "applying migration");

            let mut tx = self.pool.begin().await?;
            sqlx::query(migration.up).execute(&mut *tx).await?;
            sqlx::query(
                "INSERT INTO schema_version (version, description, applied_at) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(migration.description)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    /// Full applied-migration history, oldest first.
    pub async fn history(&self) -> MetaResult<Vec<AppliedMigration>> {
        self.initialize().await?;
        let rows = sqlx::query(
            "SELECT version, description, applied_at FROM schema_version ORDER BY version ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let applied_at: String = row.try_get("applied_at")?;
                Ok(AppliedMigration {
                    version: row.try_get("version")?,
                    description: row.try_get("description")?,
                    applied_at: DateTime::parse_from_rfc3339(&applied_at)
                        .map_err(|e| MetaError::Internal(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_migrate_applies_in_order() {
        let pool = memory_pool().await;
        let migrations = vec![
            Migration { version: 1, description: "first", up: "CREATE TABLE a (id INTEGER)" },
            Migration { version: 2, description: "second", up: "CREATE TABLE b (id INTEGER)" },
        ];
        let migrator = Migrator::new(pool, migrations);

        assert_eq!(migrator.current_version().await.unwrap(), 0);
        migrator.migrate().await.unwrap();
        assert_eq!(migrator.current_version().await.unwrap(), 2);

        let history = migrator.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 1);
    }

    #[tokio::test]
    async fn test_migrate_to_partial() {
        let pool = memory_pool().await;
        let migrations = vec![
            Migration { version: 1, description: "first", up: "CREATE TABLE a (id INTEGER)" },
            Migration { version: 2, description: "second", up: "CREATE TABLE b (id INTEGER)" },
        ];
        let migrator = Migrator::new(pool, migrations);

        migrator.migrate_to(1).await.unwrap();
        assert_eq!(migrator.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_downgrade_detected() {
        let pool = memory_pool().await;
        let migrations = vec![
            Migration { version: 1, description: "first", up: "CREATE TABLE a (id INTEGER)" },
            Migration { version: 2, description: "second", up: "CREATE TABLE b (id INTEGER)" },
        ];
        let migrator = Migrator::new(pool, migrations);
        migrator.migrate().await.unwrap();

        let err = migrator.migrate_to(1).await.unwrap_err();
        assert!(matches!(err, MetaError::DowngradeDetected { .. }));
    }
}
