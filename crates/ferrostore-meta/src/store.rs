//! Metadata store: sqlx-backed queries for every durable control-plane
//! entity in SPEC_FULL §3. Counter mutations run inside transactions so
//! concurrent puts never lose an update (§5).

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{MetaError, MetaResult};
use crate::models::*;

fn parse_ts(s: &str) -> MetaResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MetaError::Internal(e.to_string()))
}

const fn node_health_str(health: NodeHealth) -> &'static str {
    match health {
        NodeHealth::Healthy => "healthy",
        NodeHealth::Degraded => "degraded",
        NodeHealth::Unhealthy => "unhealthy",
        NodeHealth::Unknown => "unknown",
    }
}

const fn inventory_format_str(format: InventoryFormat) -> &'static str {
    match format {
        InventoryFormat::Csv => "csv",
        InventoryFormat::Json => "json",
    }
}

const fn inventory_frequency_str(frequency: InventoryFrequency) -> &'static str {
    match frequency {
        InventoryFrequency::Daily => "daily",
        InventoryFrequency::Weekly => "weekly",
    }
}

#[derive(Clone)]
pub struct MetaStore {
    pool: SqlitePool,
}

impl MetaStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- Tenants ----------------------------------------------------

    pub async fn create_tenant(&self, name: &str) -> MetaResult<Tenant> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tenants (id, name, status, created_at) VALUES (?, ?, 'active', ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_tenant(id).await?.ok_or(MetaError::NotFound)
    }

    pub async fn get_tenant(&self, id: Uuid) -> MetaResult<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::tenant_from_row).transpose()
    }

    fn tenant_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<Tenant> {
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Tenant {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            name: row.try_get("name")?,
            status: if status == "suspended" { TenantStatus::Suspended } else { TenantStatus::Active },
            max_access_keys: row.try_get("max_access_keys")?,
            max_storage_bytes: row.try_get("max_storage_bytes")?,
            max_buckets: row.try_get("max_buckets")?,
            current_access_keys: row.try_get("current_access_keys")?,
            current_storage_bytes: row.try_get("current_storage_bytes")?,
            current_buckets: row.try_get("current_buckets")?,
            created_at: parse_ts(&created_at)?,
        })
    }

    /// Reserve `delta` bytes of storage against the tenant's quota inside a
    /// transaction, refusing if the reservation would overflow `max_storage_bytes`.
    pub async fn reserve_tenant_storage(&self, tenant_id: Uuid, delta: i64) -> MetaResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT current_storage_bytes, max_storage_bytes FROM tenants WHERE id = ?",
        )
        .bind(tenant_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MetaError::NotFound)?;

        let current: i64 = row.try_get("current_storage_bytes")?;
        let max: i64 = row.try_get("max_storage_bytes")?;
        if current + delta > max {
            return Err(ferrostore_common::Error::QuotaExceeded.into());
        }

        sqlx::query("UPDATE tenants SET current_storage_bytes = current_storage_bytes + ? WHERE id = ?")
            .bind(delta)
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- Users / access keys -----------------------------------------

    pub async fn create_user(
        &self,
        tenant_id: Uuid,
        username: &str,
        password_hash: Option<&str>,
        roles: &[String],
    ) -> MetaResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, tenant_id, username, password_hash, roles, status, auth_provider, created_at) \
             VALUES (?, ?, ?, ?, ?, 'active', 'local', ?)",
        )
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .bind(username)
        .bind(password_hash)
        .bind(serde_json::to_string(roles)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn record_login_failure(&self, user_id: Uuid, max_attempts: i64, lockout_secs: i64) -> MetaResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE users SET failed_login_attempts = failed_login_attempts + 1, last_failed_login = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT failed_login_attempts FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let attempts: i64 = row.try_get("failed_login_attempts")?;
        if attempts >= max_attempts {
            let locked_until = Utc::now() + chrono::Duration::seconds(lockout_secs);
            sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
                .bind(locked_until.to_rfc3339())
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear_login_failures(&self, user_id: Uuid) -> MetaResult<()> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL WHERE id = ?",
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: Uuid) -> MetaResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::user_from_row).transpose()
    }

    pub async fn get_user_by_username(&self, tenant_id: Uuid, username: &str) -> MetaResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE tenant_id = ? AND username = ?")
            .bind(tenant_id.to_string())
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::user_from_row).transpose()
    }

    fn user_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<User> {
        let status: String = row.try_get("status")?;
        let roles: String = row.try_get("roles")?;
        let created_at: String = row.try_get("created_at")?;
        let last_failed_login: Option<String> = row.try_get("last_failed_login")?;
        let locked_until: Option<String> = row.try_get("locked_until")?;
        let totp_backup_codes: Option<String> = row.try_get("totp_backup_codes")?;
        Ok(User {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            tenant_id: Uuid::parse_str(&row.try_get::<String, _>("tenant_id")?)
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            roles: serde_json::from_str(&roles)?,
            status: match status.as_str() {
                "inactive" => UserStatus::Inactive,
                "suspended" => UserStatus::Suspended,
                _ => UserStatus::Active,
            },
            failed_login_attempts: row.try_get("failed_login_attempts")?,
            last_failed_login: last_failed_login.map(|s| parse_ts(&s)).transpose()?,
            locked_until: locked_until.map(|s| parse_ts(&s)).transpose()?,
            totp_secret: row.try_get("totp_secret")?,
            totp_backup_codes: totp_backup_codes
                .map(|s| serde_json::from_str(&s))
                .transpose()?
                .unwrap_or_default(),
            auth_provider: row.try_get("auth_provider")?,
            external_id: row.try_get("external_id")?,
            created_at: parse_ts(&created_at)?,
        })
    }

    pub async fn create_access_key(&self, user_id: Uuid, tenant_id: Uuid) -> MetaResult<AccessKey> {
        let access_key_id = format!("FSAK{}", Uuid::new_v4().simple());
        let secret_access_key = Uuid::new_v4().to_string().replace('-', "");
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO access_keys (access_key_id, secret_access_key, user_id, tenant_id, active, created_at) \
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(&access_key_id)
        .bind(&secret_access_key)
        .bind(user_id.to_string())
        .bind(tenant_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AccessKey {
            access_key_id,
            secret_access_key,
            user_id,
            tenant_id,
            active: true,
            last_used_at: None,
            created_at: now,
        })
    }

    pub async fn get_access_key(&self, access_key_id: &str) -> MetaResult<Option<AccessKey>> {
        let row = sqlx::query("SELECT * FROM access_keys WHERE access_key_id = ?")
            .bind(access_key_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let user_id: String = row.try_get("user_id")?;
        let tenant_id: String = row.try_get("tenant_id")?;
        let created_at: String = row.try_get("created_at")?;
        let last_used_at: Option<String> = row.try_get("last_used_at")?;

        Ok(Some(AccessKey {
            access_key_id: row.try_get("access_key_id")?,
            secret_access_key: row.try_get("secret_access_key")?,
            user_id: Uuid::parse_str(&user_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            active: row.try_get::<i64, _>("active")? != 0,
            last_used_at: last_used_at.map(|s| parse_ts(&s)).transpose()?,
            created_at: parse_ts(&created_at)?,
        }))
    }

    pub async fn touch_access_key(&self, access_key_id: &str) -> MetaResult<()> {
        sqlx::query("UPDATE access_keys SET last_used_at = ? WHERE access_key_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(access_key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Buckets -------------------------------------------------------

    pub async fn create_bucket(&self, tenant_id: Uuid, name: &str, owner_user_id: Uuid) -> MetaResult<Bucket> {
        let existing = sqlx::query("SELECT 1 FROM buckets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(MetaError::AlreadyExists);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO buckets (id, tenant_id, name, owner_user_id, versioning, created_at) \
             VALUES (?, ?, ?, ?, 'Unversioned', ?)",
        )
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .bind(name)
        .bind(owner_user_id.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE tenants SET current_buckets = current_buckets + 1 WHERE id = ?")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_bucket(name).await?.ok_or(MetaError::NotFound)
    }

    pub async fn get_bucket(&self, name: &str) -> MetaResult<Option<Bucket>> {
        let row = sqlx::query("SELECT * FROM buckets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::bucket_from_row).transpose()
    }

    pub async fn get_bucket_by_id(&self, id: Uuid) -> MetaResult<Option<Bucket>> {
        let row = sqlx::query("SELECT * FROM buckets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::bucket_from_row).transpose()
    }

    pub async fn list_buckets(&self, tenant_id: Uuid) -> MetaResult<Vec<Bucket>> {
        let rows = sqlx::query("SELECT * FROM buckets WHERE tenant_id = ? ORDER BY name ASC")
            .bind(tenant_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::bucket_from_row).collect()
    }

    pub async fn delete_bucket(&self, tenant_id: Uuid, name: &str) -> MetaResult<()> {
        let bucket = self.get_bucket(name).await?.ok_or(MetaError::NotFound)?;
        if bucket.object_count > 0 {
            return Err(ferrostore_common::Error::BucketNotEmpty(name.to_string()).into());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM buckets WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE tenants SET current_buckets = current_buckets - 1 WHERE id = ?")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a bucket regardless of contents (§4.5 ForceDelete). Marks the
    /// bucket `deleting` so concurrent writers racing against this call see
    /// a bucket already on its way out, then removes every object version
    /// row and the bucket row itself, and credits back the tenant's
    /// storage-byte reservation, all inside one transaction.
    pub async fn force_delete_bucket(&self, tenant_id: Uuid, name: &str) -> MetaResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM buckets WHERE name = ?").bind(name).fetch_optional(&mut *tx).await?;
        let bucket = row.map(Self::bucket_from_row).transpose()?.ok_or(MetaError::NotFound)?;

        sqlx::query("UPDATE buckets SET deleting = 1 WHERE name = ?").bind(name).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM objects WHERE bucket_id = ?").bind(bucket.id.to_string()).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM buckets WHERE name = ?").bind(name).execute(&mut *tx).await?;
        sqlx::query("UPDATE tenants SET current_buckets = current_buckets - 1, current_storage_bytes = current_storage_bytes - ? WHERE id = ?")
            .bind(bucket.current_storage_bytes)
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_bucket_versioning(&self, name: &str, versioning: VersioningState) -> MetaResult<()> {
        let value = match versioning {
            VersioningState::Unversioned => "Unversioned",
            VersioningState::Enabled => "Enabled",
            VersioningState::Suspended => "Suspended",
        };
        sqlx::query("UPDATE buckets SET versioning = ? WHERE name = ?")
            .bind(value)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_policy_json(&self, name: &str, policy_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET policy_json = ? WHERE name = ?")
            .bind(policy_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_cors_json(&self, name: &str, cors_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET cors_json = ? WHERE name = ?")
            .bind(cors_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_lifecycle_json(&self, name: &str, lifecycle_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET lifecycle_json = ? WHERE name = ?")
            .bind(lifecycle_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_tags_json(&self, name: &str, tags_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET tags_json = ? WHERE name = ?")
            .bind(tags_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_object_lock_json(&self, name: &str, object_lock_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET object_lock_json = ? WHERE name = ?")
            .bind(object_lock_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bucket_acl_json(&self, name: &str, acl_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE buckets SET acl_json = ? WHERE name = ?")
            .bind(acl_json)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Adjust a bucket's denormalized object/byte counters atomically.
    pub async fn adjust_bucket_counters(&self, name: &str, object_delta: i64, byte_delta: i64) -> MetaResult<()> {
        sqlx::query(
            "UPDATE buckets SET object_count = object_count + ?, current_storage_bytes = current_storage_bytes + ? WHERE name = ?",
        )
        .bind(object_delta)
        .bind(byte_delta)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn bucket_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<Bucket> {
        let tenant_id: String = row.try_get("tenant_id")?;
        let owner_user_id: String = row.try_get("owner_user_id")?;
        let versioning: String = row.try_get("versioning")?;
        let created_at: String = row.try_get("created_at")?;
        Ok(Bucket {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            name: row.try_get("name")?,
            owner_user_id: Uuid::parse_str(&owner_user_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            versioning: match versioning.as_str() {
                "Enabled" => VersioningState::Enabled,
                "Suspended" => VersioningState::Suspended,
                _ => VersioningState::Unversioned,
            },
            policy_json: row.try_get("policy_json")?,
            cors_json: row.try_get("cors_json")?,
            lifecycle_json: row.try_get("lifecycle_json")?,
            tags_json: row.try_get("tags_json")?,
            object_lock_json: row.try_get("object_lock_json")?,
            acl_json: row.try_get("acl_json")?,
            object_count: row.try_get("object_count")?,
            current_storage_bytes: row.try_get("current_storage_bytes")?,
            deleting: row.try_get::<i64, _>("deleting")? != 0,
            created_at: parse_ts(&created_at)?,
        })
    }

    // ---- Bucket permissions (explicit grants, below policy/ACL in the
    // permission-check order) -------------------------------------------

    pub async fn grant_bucket_permission(
        &self,
        bucket_id: Uuid,
        grantee_type: &str,
        grantee_id: &str,
        actions: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> MetaResult<()> {
        sqlx::query(
            "INSERT INTO bucket_permissions (bucket_id, grantee_type, grantee_id, actions, expires_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(bucket_id, grantee_type, grantee_id) DO UPDATE SET actions = excluded.actions, expires_at = excluded.expires_at",
        )
        .bind(bucket_id.to_string())
        .bind(grantee_type)
        .bind(grantee_id)
        .bind(serde_json::to_string(actions)?)
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_bucket_permission(&self, bucket_id: Uuid, grantee_type: &str, grantee_id: &str) -> MetaResult<()> {
        sqlx::query("DELETE FROM bucket_permissions WHERE bucket_id = ? AND grantee_type = ? AND grantee_id = ?")
            .bind(bucket_id.to_string())
            .bind(grantee_type)
            .bind(grantee_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_bucket_permissions(&self, bucket_id: Uuid) -> MetaResult<Vec<BucketPermission>> {
        let rows = sqlx::query("SELECT * FROM bucket_permissions WHERE bucket_id = ?")
            .bind(bucket_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let actions: String = row.try_get("actions")?;
                let expires_at: Option<String> = row.try_get("expires_at")?;
                Ok(BucketPermission {
                    bucket_id,
                    grantee_type: row.try_get("grantee_type")?,
                    grantee_id: row.try_get("grantee_id")?,
                    actions: serde_json::from_str(&actions)?,
                    expires_at: expires_at.map(|s| parse_ts(&s)).transpose()?,
                })
            })
            .collect()
    }

    // ---- Inventory (§4.9) ------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_inventory_config(
        &self,
        bucket_id: Uuid,
        destination_bucket: &str,
        destination_prefix: &str,
        format: InventoryFormat,
        frequency: InventoryFrequency,
        schedule_time: &str,
        next_run_at: DateTime<Utc>,
    ) -> MetaResult<InventoryConfig> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO inventory_configs \
             (id, bucket_id, destination_bucket, destination_prefix, format, frequency, schedule_time, enabled, next_run_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(id.to_string())
        .bind(bucket_id.to_string())
        .bind(destination_bucket)
        .bind(destination_prefix)
        .bind(inventory_format_str(format))
        .bind(inventory_frequency_str(frequency))
        .bind(schedule_time)
        .bind(next_run_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_inventory_config(id).await?.ok_or(MetaError::NotFound)
    }

    pub async fn get_inventory_config(&self, id: Uuid) -> MetaResult<Option<InventoryConfig>> {
        let row = sqlx::query("SELECT * FROM inventory_configs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::inventory_config_from_row).transpose()
    }

    pub async fn list_inventory_configs_for_bucket(&self, bucket_id: Uuid) -> MetaResult<Vec<InventoryConfig>> {
        let rows = sqlx::query("SELECT * FROM inventory_configs WHERE bucket_id = ?")
            .bind(bucket_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::inventory_config_from_row).collect()
    }

    /// Enabled configs whose `next_run_at` has already passed (§4.9's tick query).
    pub async fn list_due_inventory_configs(&self, now: DateTime<Utc>) -> MetaResult<Vec<InventoryConfig>> {
        let rows = sqlx::query("SELECT * FROM inventory_configs WHERE enabled = 1 AND next_run_at <= ?")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::inventory_config_from_row).collect()
    }

    pub async fn set_inventory_config_enabled(&self, id: Uuid, enabled: bool) -> MetaResult<()> {
        sqlx::query("UPDATE inventory_configs SET enabled = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_inventory_config(&self, id: Uuid) -> MetaResult<()> {
        sqlx::query("DELETE FROM inventory_configs WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;
        Ok(())
    }

    /// Record a completed (successful or failed) scheduling pass: stamp
    /// `last_run_at` and the freshly computed `next_run_at`.
    pub async fn record_inventory_run(&self, id: Uuid, last_run_at: DateTime<Utc>, next_run_at: DateTime<Utc>) -> MetaResult<()> {
        sqlx::query("UPDATE inventory_configs SET last_run_at = ?, next_run_at = ? WHERE id = ?")
            .bind(last_run_at.to_rfc3339())
            .bind(next_run_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn inventory_config_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<InventoryConfig> {
        let id: String = row.try_get("id")?;
        let bucket_id: String = row.try_get("bucket_id")?;
        let format: String = row.try_get("format")?;
        let frequency: String = row.try_get("frequency")?;
        let last_run_at: Option<String> = row.try_get("last_run_at")?;
        let next_run_at: Option<String> = row.try_get("next_run_at")?;
        Ok(InventoryConfig {
            id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
            bucket_id: Uuid::parse_str(&bucket_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            destination_bucket: row.try_get("destination_bucket")?,
            destination_prefix: row.try_get("destination_prefix")?,
            format: match format.as_str() {
                "json" => InventoryFormat::Json,
                _ => InventoryFormat::Csv,
            },
            frequency: match frequency.as_str() {
                "weekly" => InventoryFrequency::Weekly,
                _ => InventoryFrequency::Daily,
            },
            schedule_time: row.try_get("schedule_time")?,
            enabled: row.try_get::<i64, _>("enabled")? != 0,
            last_run_at: last_run_at.map(|s| parse_ts(&s)).transpose()?,
            next_run_at: next_run_at.map(|s| parse_ts(&s)).transpose()?,
        })
    }

    pub async fn create_inventory_report(&self, config_id: Uuid) -> MetaResult<InventoryReport> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        sqlx::query(
            "INSERT INTO inventory_reports (id, config_id, status, started_at) VALUES (?, ?, 'pending', ?)",
        )
        .bind(id.to_string())
        .bind(config_id.to_string())
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(InventoryReport {
            id,
            config_id,
            status: InventoryReportStatus::Pending,
            object_count: 0,
            report_key: None,
            error: None,
            started_at,
            completed_at: None,
        })
    }

    pub async fn complete_inventory_report(&self, id: Uuid, object_count: i64, report_key: &str) -> MetaResult<()> {
        sqlx::query(
            "UPDATE inventory_reports SET status = 'completed', object_count = ?, report_key = ?, completed_at = ? WHERE id = ?",
        )
        .bind(object_count)
        .bind(report_key)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_inventory_report(&self, id: Uuid, error: &str) -> MetaResult<()> {
        sqlx::query("UPDATE inventory_reports SET status = 'failed', error = ?, completed_at = ? WHERE id = ?")
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_inventory_reports_for_config(&self, config_id: Uuid) -> MetaResult<Vec<InventoryReport>> {
        let rows = sqlx::query("SELECT * FROM inventory_reports WHERE config_id = ? ORDER BY started_at DESC")
            .bind(config_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let config_id: String = row.try_get("config_id")?;
                let status: String = row.try_get("status")?;
                let started_at: String = row.try_get("started_at")?;
                let completed_at: Option<String> = row.try_get("completed_at")?;
                Ok(InventoryReport {
                    id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
                    config_id: Uuid::parse_str(&config_id).map_err(|e| MetaError::Internal(e.to_string()))?,
                    status: match status.as_str() {
                        "completed" => InventoryReportStatus::Completed,
                        "failed" => InventoryReportStatus::Failed,
                        _ => InventoryReportStatus::Pending,
                    },
                    object_count: row.try_get("object_count")?,
                    report_key: row.try_get("report_key")?,
                    error: row.try_get("error")?,
                    started_at: parse_ts(&started_at)?,
                    completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
                })
            })
            .collect()
    }

    // ---- Objects --------------------------------------------------------

    /// Insert a new object version, flipping any previous `is_latest` row
    /// for the same key to false first (a no-op for unversioned buckets,
    /// which only ever keep one row).
    pub async fn put_object(&self, bucket_id: Uuid, record: &ObjectRecord) -> MetaResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE objects SET is_latest = 0 WHERE bucket_id = ? AND key = ? AND is_latest = 1")
            .bind(bucket_id.to_string())
            .bind(&record.key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO objects (bucket_id, key, version_id, is_latest, is_delete_marker, size, etag, \
             content_type, storage_class, metadata_json, tags_json, retention_mode, retain_until, legal_hold, last_modified) \
             VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(bucket_id.to_string())
        .bind(&record.key)
        .bind(&record.version_id)
        .bind(record.is_delete_marker as i64)
        .bind(record.size)
        .bind(&record.etag)
        .bind(&record.content_type)
        .bind(&record.storage_class)
        .bind(&record.metadata_json)
        .bind(&record.tags_json)
        .bind(record.retention_mode.map(|m| match m {
            RetentionMode::Governance => "GOVERNANCE",
            RetentionMode::Compliance => "COMPLIANCE",
        }))
        .bind(record.retain_until.map(|t| t.to_rfc3339()))
        .bind(record.legal_hold as i64)
        .bind(record.last_modified.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_latest_object(&self, bucket_id: Uuid, key: &str) -> MetaResult<Option<ObjectRecord>> {
        let row = sqlx::query(
            "SELECT * FROM objects WHERE bucket_id = ? AND key = ? AND is_latest = 1",
        )
        .bind(bucket_id.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::object_from_row).transpose()
    }

    pub async fn get_object_version(&self, bucket_id: Uuid, key: &str, version_id: &str) -> MetaResult<Option<ObjectRecord>> {
        let row = sqlx::query(
            "SELECT * FROM objects WHERE bucket_id = ? AND key = ? AND version_id = ?",
        )
        .bind(bucket_id.to_string())
        .bind(key)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::object_from_row).transpose()
    }

    pub async fn list_objects(&self, bucket_id: Uuid, prefix: &str, max_keys: i64, marker: &str) -> MetaResult<Vec<ObjectRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM objects WHERE bucket_id = ? AND is_latest = 1 AND is_delete_marker = 0 \
             AND key LIKE ? AND key > ? ORDER BY key ASC LIMIT ?",
        )
        .bind(bucket_id.to_string())
        .bind(format!("{prefix}%"))
        .bind(marker)
        .bind(max_keys)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::object_from_row).collect()
    }

    pub async fn delete_object_version(&self, bucket_id: Uuid, key: &str, version_id: &str) -> MetaResult<()> {
        sqlx::query("DELETE FROM objects WHERE bucket_id = ? AND key = ? AND version_id = ?")
            .bind(bucket_id.to_string())
            .bind(key)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_object_tags_json(&self, bucket_id: Uuid, key: &str, version_id: &str, tags_json: Option<&str>) -> MetaResult<()> {
        sqlx::query("UPDATE objects SET tags_json = ? WHERE bucket_id = ? AND key = ? AND version_id = ?")
            .bind(tags_json)
            .bind(bucket_id.to_string())
            .bind(key)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_object_retention(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: &str,
        mode: RetentionMode,
        retain_until: DateTime<Utc>,
    ) -> MetaResult<()> {
        let mode = match mode {
            RetentionMode::Governance => "GOVERNANCE",
            RetentionMode::Compliance => "COMPLIANCE",
        };
        sqlx::query("UPDATE objects SET retention_mode = ?, retain_until = ? WHERE bucket_id = ? AND key = ? AND version_id = ?")
            .bind(mode)
            .bind(retain_until.to_rfc3339())
            .bind(bucket_id.to_string())
            .bind(key)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_object_legal_hold(&self, bucket_id: Uuid, key: &str, version_id: &str, legal_hold: bool) -> MetaResult<()> {
        sqlx::query("UPDATE objects SET legal_hold = ? WHERE bucket_id = ? AND key = ? AND version_id = ?")
            .bind(legal_hold as i64)
            .bind(bucket_id.to_string())
            .bind(key)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn object_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<ObjectRecord> {
        let bucket_id: String = row.try_get("bucket_id")?;
        let last_modified: String = row.try_get("last_modified")?;
        let retain_until: Option<String> = row.try_get("retain_until")?;
        let retention_mode: Option<String> = row.try_get("retention_mode")?;
        Ok(ObjectRecord {
            bucket_id: Uuid::parse_str(&bucket_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            key: row.try_get("key")?,
            version_id: row.try_get("version_id")?,
            is_latest: row.try_get::<i64, _>("is_latest")? != 0,
            is_delete_marker: row.try_get::<i64, _>("is_delete_marker")? != 0,
            size: row.try_get("size")?,
            etag: row.try_get("etag")?,
            content_type: row.try_get("content_type")?,
            storage_class: row.try_get("storage_class")?,
            metadata_json: row.try_get("metadata_json")?,
            tags_json: row.try_get("tags_json")?,
            retention_mode: retention_mode.map(|m| if m == "COMPLIANCE" { RetentionMode::Compliance } else { RetentionMode::Governance }),
            retain_until: retain_until.map(|s| parse_ts(&s)).transpose()?,
            legal_hold: row.try_get::<i64, _>("legal_hold")? != 0,
            last_modified: parse_ts(&last_modified)?,
        })
    }

    // ---- Multipart uploads ----------------------------------------------

    pub async fn create_multipart_upload(
        &self,
        bucket_id: Uuid,
        key: &str,
        initiator_user_id: Uuid,
        content_type: &str,
        metadata_json: &str,
        storage_class: &str,
    ) -> MetaResult<Uuid> {
        let upload_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO multipart_uploads (upload_id, bucket_id, key, initiator_user_id, state, content_type, metadata_json, storage_class, started_at) \
             VALUES (?, ?, ?, ?, 'Initiated', ?, ?, ?, ?)",
        )
        .bind(upload_id.to_string())
        .bind(bucket_id.to_string())
        .bind(key)
        .bind(initiator_user_id.to_string())
        .bind(content_type)
        .bind(metadata_json)
        .bind(storage_class)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(upload_id)
    }

    pub async fn upsert_part(&self, upload_id: Uuid, part_number: i32, size: i64, etag: &str) -> MetaResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ? AND part_number = ?")
            .bind(upload_id.to_string())
            .bind(part_number)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO multipart_parts (upload_id, part_number, size, etag, uploaded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(upload_id.to_string())
        .bind(part_number)
        .bind(size)
        .bind(etag)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE multipart_uploads SET state = 'PartsUploading' WHERE upload_id = ? AND state = 'Initiated'")
            .bind(upload_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_multipart_upload(&self, upload_id: Uuid) -> MetaResult<Option<MultipartUpload>> {
        let row = sqlx::query("SELECT * FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::multipart_upload_from_row).transpose()
    }

    fn multipart_upload_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<MultipartUpload> {
        let bucket_id: String = row.try_get("bucket_id")?;
        let initiator_user_id: String = row.try_get("initiator_user_id")?;
        let state: String = row.try_get("state")?;
        let started_at: String = row.try_get("started_at")?;
        Ok(MultipartUpload {
            upload_id: Uuid::parse_str(&row.try_get::<String, _>("upload_id")?)
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            bucket_id: Uuid::parse_str(&bucket_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            key: row.try_get("key")?,
            initiator_user_id: Uuid::parse_str(&initiator_user_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            state: match state.as_str() {
                "PartsUploading" => UploadState::PartsUploading,
                "Completed" => UploadState::Completed,
                "Aborted" => UploadState::Aborted,
                _ => UploadState::Initiated,
            },
            content_type: row.try_get("content_type")?,
            metadata_json: row.try_get("metadata_json")?,
            storage_class: row.try_get("storage_class")?,
            started_at: parse_ts(&started_at)?,
        })
    }

    pub async fn list_parts(&self, upload_id: Uuid) -> MetaResult<Vec<PartRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM multipart_parts WHERE upload_id = ? ORDER BY part_number ASC",
        )
        .bind(upload_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let uploaded_at: String = row.try_get("uploaded_at")?;
                Ok(PartRecord {
                    upload_id,
                    part_number: row.try_get("part_number")?,
                    size: row.try_get("size")?,
                    etag: row.try_get("etag")?,
                    uploaded_at: parse_ts(&uploaded_at)?,
                })
            })
            .collect()
    }

    pub async fn finalize_multipart_upload(&self, upload_id: Uuid, completed: bool) -> MetaResult<()> {
        let state = if completed { "Completed" } else { "Aborted" };
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE multipart_uploads SET state = ? WHERE upload_id = ?")
            .bind(state)
            .bind(upload_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- Replication ------------------------------------------------------

    pub async fn create_replication_rule(&self, rule: &ReplicationRule) -> MetaResult<()> {
        let mode = match rule.mode {
            ReplicationMode::Realtime => "realtime",
            ReplicationMode::Scheduled => "scheduled",
        };
        let conflict_resolution = match rule.conflict_resolution {
            ConflictResolution::LastWriteWins => "last_write_wins",
            ConflictResolution::SourceWins => "source_wins",
        };
        sqlx::query(
            "INSERT INTO replication_rules \
             (id, tenant_id, source_bucket, destination_external_endpoint, destination_external_access_key, \
              destination_external_secret_key, destination_node_id, destination_bucket, prefix_filter, mode, \
              conflict_resolution, replicate_deletes, replicate_metadata, priority, enabled) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(rule.tenant_id.to_string())
        .bind(&rule.source_bucket)
        .bind(&rule.destination_external_endpoint)
        .bind(&rule.destination_external_access_key)
        .bind(&rule.destination_external_secret_key)
        .bind(rule.destination_node_id.map(|id| id.to_string()))
        .bind(&rule.destination_bucket)
        .bind(&rule.prefix_filter)
        .bind(mode)
        .bind(conflict_resolution)
        .bind(i64::from(rule.replicate_deletes))
        .bind(i64::from(rule.replicate_metadata))
        .bind(rule.priority)
        .bind(i64::from(rule.enabled))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_replication_rule(&self, id: Uuid) -> MetaResult<Option<ReplicationRule>> {
        let row = sqlx::query("SELECT * FROM replication_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::replication_rule_from_row).transpose()
    }

    /// Rules that apply to a mutation on `bucket`, ordered highest priority first.
    pub async fn list_replication_rules_for_bucket(&self, tenant_id: Uuid, bucket: &str) -> MetaResult<Vec<ReplicationRule>> {
        let rows = sqlx::query(
            "SELECT * FROM replication_rules WHERE tenant_id = ? AND source_bucket = ? AND enabled = 1 \
             ORDER BY priority DESC",
        )
        .bind(tenant_id.to_string())
        .bind(bucket)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::replication_rule_from_row).collect()
    }

    pub async fn set_replication_rule_enabled(&self, id: Uuid, enabled: bool) -> MetaResult<()> {
        sqlx::query("UPDATE replication_rules SET enabled = ? WHERE id = ?")
            .bind(i64::from(enabled))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_replication_rule(&self, id: Uuid) -> MetaResult<()> {
        sqlx::query("DELETE FROM replication_rules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn replication_rule_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<ReplicationRule> {
        let id: String = row.try_get("id")?;
        let tenant_id: String = row.try_get("tenant_id")?;
        let destination_node_id: Option<String> = row.try_get("destination_node_id")?;
        let mode: String = row.try_get("mode")?;
        let conflict_resolution: String = row.try_get("conflict_resolution")?;
        Ok(ReplicationRule {
            id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
            tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            source_bucket: row.try_get("source_bucket")?,
            destination_external_endpoint: row.try_get("destination_external_endpoint")?,
            destination_external_access_key: row.try_get("destination_external_access_key")?,
            destination_external_secret_key: row.try_get("destination_external_secret_key")?,
            destination_node_id: destination_node_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| MetaError::Internal(e.to_string()))?,
            destination_bucket: row.try_get("destination_bucket")?,
            prefix_filter: row.try_get("prefix_filter")?,
            mode: match mode.as_str() {
                "scheduled" => ReplicationMode::Scheduled,
                _ => ReplicationMode::Realtime,
            },
            conflict_resolution: match conflict_resolution.as_str() {
                "source_wins" => ConflictResolution::SourceWins,
                _ => ConflictResolution::LastWriteWins,
            },
            replicate_deletes: row.try_get::<i64, _>("replicate_deletes")? != 0,
            replicate_metadata: row.try_get::<i64, _>("replicate_metadata")? != 0,
            priority: row.try_get("priority")?,
            enabled: row.try_get::<i64, _>("enabled")? != 0,
        })
    }

    pub async fn enqueue_replication_work_item(
        &self,
        rule_id: Uuid,
        object_key: &str,
        version_id: &str,
        op: ReplicationOp,
    ) -> MetaResult<Uuid> {
        let id = Uuid::new_v4();
        let op_str = match op {
            ReplicationOp::Put => "PUT",
            ReplicationOp::Delete => "DELETE",
            ReplicationOp::Metadata => "METADATA",
        };
        sqlx::query(
            "INSERT INTO replication_work_items (id, rule_id, object_key, version_id, op, status, scheduled_at) \
             VALUES (?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(id.to_string())
        .bind(rule_id.to_string())
        .bind(object_key)
        .bind(version_id)
        .bind(op_str)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Atomically claim up to `limit` pending, due work items by flipping
    /// their status to `in-flight` — duplicate dispatch across workers is
    /// impossible because the `UPDATE ... WHERE status = 'pending'` only
    /// matches rows no other worker has already claimed.
    pub async fn claim_replication_work_items(&self, limit: i64) -> MetaResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT id FROM replication_work_items WHERE status = 'pending' AND scheduled_at <= ? ORDER BY scheduled_at ASC LIMIT ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            let result = sqlx::query(
                "UPDATE replication_work_items SET status = 'in-flight' WHERE id = ? AND status = 'pending'",
            )
            .bind(&id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                claimed.push(Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?);
            }
        }
        Ok(claimed)
    }

    pub async fn complete_replication_work_item(&self, id: Uuid) -> MetaResult<()> {
        sqlx::query("UPDATE replication_work_items SET status = 'completed' WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fail_replication_work_item(
        &self,
        id: Uuid,
        max_attempts: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> MetaResult<()> {
        let row = sqlx::query("SELECT attempts FROM replication_work_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        let attempts: i32 = row.try_get("attempts")?;
        let attempts = attempts + 1;

        if attempts >= max_attempts {
            sqlx::query(
                "UPDATE replication_work_items SET status = 'failed', attempts = ?, last_error = ? WHERE id = ?",
            )
            .bind(attempts)
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE replication_work_items SET status = 'pending', attempts = ?, scheduled_at = ?, last_error = ? WHERE id = ?",
            )
            .bind(attempts)
            .bind(next_retry_at.to_rfc3339())
            .bind(error)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Reset any work item stuck `in-flight` for longer than `timeout` back
    /// to `pending` (recovery after an abrupt worker termination, §5).
    pub async fn reset_stale_in_flight(&self, timeout: chrono::Duration) -> MetaResult<u64> {
        let cutoff = Utc::now() - timeout;
        let result = sqlx::query(
            "UPDATE replication_work_items SET status = 'pending' WHERE status = 'in-flight' AND scheduled_at <= ?",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_replication_work_item(&self, id: Uuid) -> MetaResult<Option<ReplicationWorkItem>> {
        let row = sqlx::query("SELECT * FROM replication_work_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::work_item_from_row).transpose()
    }

    fn work_item_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<ReplicationWorkItem> {
        let id: String = row.try_get("id")?;
        let rule_id: String = row.try_get("rule_id")?;
        let op: String = row.try_get("op")?;
        let status: String = row.try_get("status")?;
        let scheduled_at: String = row.try_get("scheduled_at")?;
        Ok(ReplicationWorkItem {
            id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
            rule_id: Uuid::parse_str(&rule_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            object_key: row.try_get("object_key")?,
            version_id: row.try_get("version_id")?,
            op: match op.as_str() {
                "DELETE" => ReplicationOp::Delete,
                "METADATA" => ReplicationOp::Metadata,
                _ => ReplicationOp::Put,
            },
            status: match status.as_str() {
                "in-flight" => WorkItemStatus::InFlight,
                "completed" => WorkItemStatus::Completed,
                "failed" => WorkItemStatus::Failed,
                _ => WorkItemStatus::Pending,
            },
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            scheduled_at: parse_ts(&scheduled_at)?,
            last_error: row.try_get("last_error")?,
        })
    }

    /// Record the result of a replication attempt for `{rule, key, version}`,
    /// so status can be queried independently of the (pruned) work-item queue.
    /// Record a successful replication: stamps `replicated_at` and clears any prior error.
    pub async fn record_replication_success(
        &self,
        rule_id: Uuid,
        object_key: &str,
        version_id: &str,
        etag: &str,
        size: i64,
    ) -> MetaResult<()> {
        sqlx::query(
            "INSERT INTO replication_status (rule_id, object_key, version_id, etag, size, replicated_at, error) \
             VALUES (?, ?, ?, ?, ?, ?, NULL) \
             ON CONFLICT(rule_id, object_key, version_id) DO UPDATE SET \
                etag = excluded.etag, size = excluded.size, replicated_at = excluded.replicated_at, error = NULL",
        )
        .bind(rule_id.to_string())
        .bind(object_key)
        .bind(version_id)
        .bind(etag)
        .bind(size)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed replication attempt without disturbing the last
    /// successful `replicated_at` (if any).
    pub async fn record_replication_failure(
        &self,
        rule_id: Uuid,
        object_key: &str,
        version_id: &str,
        error: &str,
    ) -> MetaResult<()> {
        sqlx::query(
            "INSERT INTO replication_status (rule_id, object_key, version_id, error) VALUES (?, ?, ?, ?) \
             ON CONFLICT(rule_id, object_key, version_id) DO UPDATE SET error = excluded.error",
        )
        .bind(rule_id.to_string())
        .bind(object_key)
        .bind(version_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_replication_status(
        &self,
        rule_id: Uuid,
        object_key: &str,
        version_id: &str,
    ) -> MetaResult<Option<ReplicationStatusRow>> {
        let row = sqlx::query(
            "SELECT * FROM replication_status WHERE rule_id = ? AND object_key = ? AND version_id = ?",
        )
        .bind(rule_id.to_string())
        .bind(object_key)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::status_row_from_row).transpose()
    }

    fn status_row_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<ReplicationStatusRow> {
        let rule_id: String = row.try_get("rule_id")?;
        let replicated_at: Option<String> = row.try_get("replicated_at")?;
        Ok(ReplicationStatusRow {
            rule_id: Uuid::parse_str(&rule_id).map_err(|e| MetaError::Internal(e.to_string()))?,
            object_key: row.try_get("object_key")?,
            version_id: row.try_get("version_id")?,
            etag: row.try_get("etag")?,
            size: row.try_get("size")?,
            replicated_at: replicated_at.map(|s| parse_ts(&s)).transpose()?,
            error: row.try_get("error")?,
        })
    }

    // ---- Cluster ------------------------------------------------------

    pub async fn register_cluster_node(&self, node: &ClusterNode) -> MetaResult<()> {
        let health = node_health_str(node.health);
        sqlx::query(
            "INSERT INTO cluster_nodes (id, endpoint, shared_token, region, priority, health, last_health_check, capacity_bytes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET endpoint = excluded.endpoint, shared_token = excluded.shared_token, \
                region = excluded.region, priority = excluded.priority",
        )
        .bind(node.id.to_string())
        .bind(&node.endpoint)
        .bind(&node.shared_token)
        .bind(&node.region)
        .bind(node.priority)
        .bind(health)
        .bind(node.last_health_check.map(|t| t.to_rfc3339()))
        .bind(node.capacity_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_cluster_node(&self, id: Uuid) -> MetaResult<Option<ClusterNode>> {
        let row = sqlx::query("SELECT * FROM cluster_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::cluster_node_from_row).transpose()
    }

    pub async fn list_cluster_nodes(&self) -> MetaResult<Vec<ClusterNode>> {
        let rows = sqlx::query("SELECT * FROM cluster_nodes ORDER BY priority DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::cluster_node_from_row).collect()
    }

    pub async fn update_node_health(&self, id: Uuid, health: NodeHealth) -> MetaResult<()> {
        sqlx::query("UPDATE cluster_nodes SET health = ?, last_health_check = ? WHERE id = ?")
            .bind(node_health_str(health))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn cluster_node_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<ClusterNode> {
        let id: String = row.try_get("id")?;
        let health: String = row.try_get("health")?;
        let last_health_check: Option<String> = row.try_get("last_health_check")?;
        Ok(ClusterNode {
            id: Uuid::parse_str(&id).map_err(|e| MetaError::Internal(e.to_string()))?,
            endpoint: row.try_get("endpoint")?,
            shared_token: row.try_get("shared_token")?,
            region: row.try_get("region")?,
            priority: row.try_get("priority")?,
            health: match health.as_str() {
                "healthy" => NodeHealth::Healthy,
                "degraded" => NodeHealth::Degraded,
                "unhealthy" => NodeHealth::Unhealthy,
                _ => NodeHealth::Unknown,
            },
            last_health_check: last_health_check.map(|s| parse_ts(&s)).transpose()?,
            capacity_bytes: row.try_get("capacity_bytes")?,
        })
    }

    pub async fn upsert_sync_row(&self, entity_id: &str, destination_node: Uuid, checksum: &str) -> MetaResult<()> {
        sqlx::query(
            "INSERT INTO sync_rows (entity_id, destination_node, checksum, acknowledged, updated_at) VALUES (?, ?, ?, 0, ?) \
             ON CONFLICT(entity_id, destination_node) DO UPDATE SET checksum = excluded.checksum, acknowledged = 0, updated_at = excluded.updated_at",
        )
        .bind(entity_id)
        .bind(destination_node.to_string())
        .bind(checksum)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn acknowledge_sync_row(&self, entity_id: &str, destination_node: Uuid) -> MetaResult<()> {
        sqlx::query("UPDATE sync_rows SET acknowledged = 1 WHERE entity_id = ? AND destination_node = ?")
            .bind(entity_id)
            .bind(destination_node.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sync rows still unacknowledged by `destination_node`, oldest first —
    /// the sync worker's push queue for one peer.
    pub async fn list_unacknowledged_sync_rows(&self, destination_node: Uuid) -> MetaResult<Vec<SyncRow>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_rows WHERE destination_node = ? AND acknowledged = 0 ORDER BY updated_at ASC",
        )
        .bind(destination_node.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::sync_row_from_row).collect()
    }

    fn sync_row_from_row(row: sqlx::sqlite::SqliteRow) -> MetaResult<SyncRow> {
        let destination_node: String = row.try_get("destination_node")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(SyncRow {
            entity_id: row.try_get("entity_id")?,
            destination_node: Uuid::parse_str(&destination_node).map_err(|e| MetaError::Internal(e.to_string()))?,
            checksum: row.try_get("checksum")?,
            acknowledged: row.try_get::<i64, _>("acknowledged")? != 0,
            updated_at: parse_ts(&updated_at)?,
        })
    }

    pub async fn record_tombstone(&self, entity_type: &str, entity_id: &str, deleted_by_node: Uuid) -> MetaResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO cluster_deletion_log (entity_type, entity_id, deleted_by_node, deleted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(deleted_by_node.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn purge_old_tombstones(&self, older_than: chrono::Duration) -> MetaResult<u64> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query("DELETE FROM cluster_deletion_log WHERE deleted_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Tombstones recorded since `since`, for a peer pulling the deletion log.
    pub async fn list_tombstones_since(&self, since: DateTime<Utc>) -> MetaResult<Vec<DeletionTombstone>> {
        let rows = sqlx::query("SELECT * FROM cluster_deletion_log WHERE deleted_at >= ? ORDER BY deleted_at ASC")
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let deleted_by_node: String = row.try_get("deleted_by_node")?;
                let deleted_at: String = row.try_get("deleted_at")?;
                Ok(DeletionTombstone {
                    entity_type: row.try_get("entity_type")?,
                    entity_id: row.try_get("entity_id")?,
                    deleted_by_node: Uuid::parse_str(&deleted_by_node).map_err(|e| MetaError::Internal(e.to_string()))?,
                    deleted_at: parse_ts(&deleted_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrator::Migrator;
    use crate::schema::metadata_migrations;

    async fn test_store() -> MetaStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        Migrator::new(pool.clone(), metadata_migrations()).migrate().await.unwrap();
        MetaStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_tenant() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let fetched = store.get_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "acme");
        assert_eq!(fetched.current_storage_bytes, 0);
    }

    #[tokio::test]
    async fn test_reserve_tenant_storage_rejects_overflow() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        sqlx::query("UPDATE tenants SET max_storage_bytes = 100 WHERE id = ?")
            .bind(tenant.id.to_string())
            .execute(store.pool())
            .await
            .unwrap();

        store.reserve_tenant_storage(tenant.id, 50).await.unwrap();
        let err = store.reserve_tenant_storage(tenant.id, 100).await.unwrap_err();
        assert!(matches!(err, MetaError::Domain(ferrostore_common::Error::QuotaExceeded)));
    }

    #[tokio::test]
    async fn test_create_bucket_rejects_duplicate() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();

        store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();
        let err = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap_err();
        assert!(matches!(err, MetaError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_delete_bucket_refuses_non_empty() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();
        store.adjust_bucket_counters("my-bucket", 1, 100).await.unwrap();

        let err = store.delete_bucket(tenant.id, "my-bucket").await.unwrap_err();
        assert!(matches!(err, MetaError::Domain(ferrostore_common::Error::BucketNotEmpty(_))));
        assert!(store.get_bucket_by_id(bucket.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_force_delete_bucket_removes_contents_and_credits_quota() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();
        store.reserve_tenant_storage(tenant.id, 100).await.unwrap();
        store.adjust_bucket_counters("my-bucket", 1, 100).await.unwrap();
        store
            .put_object(
                bucket.id,
                &ObjectRecord {
                    bucket_id: bucket.id,
                    key: "a.txt".into(),
                    version_id: "null".into(),
                    is_latest: true,
                    is_delete_marker: false,
                    size: 100,
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

        store.force_delete_bucket(tenant.id, "my-bucket").await.unwrap();

        assert!(store.get_bucket(&"my-bucket").await.unwrap().is_none());
        let tenant_after = store.get_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(tenant_after.current_buckets, 0);
        assert_eq!(tenant_after.current_storage_bytes, 0);
    }

    #[tokio::test]
    async fn test_put_object_flips_latest() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();
        store.set_bucket_versioning("my-bucket", VersioningState::Enabled).await.unwrap();

        let now = Utc::now();
        let v1 = ObjectRecord {
            bucket_id: bucket.id,
            key: "a.txt".into(),
            version_id: "v1".into(),
            is_latest: true,
            is_delete_marker: false,
            size: 3,
            etag: "abc".into(),
            content_type: "text/plain".into(),
            storage_class: "STANDARD".into(),
            metadata_json: "{}".into(),
            tags_json: None,
            retention_mode: None,
            retain_until: None,
            legal_hold: false,
            last_modified: now,
        };
        store.put_object(bucket.id, &v1).await.unwrap();

        let mut v2 = v1.clone();
        v2.version_id = "v2".into();
        store.put_object(bucket.id, &v2).await.unwrap();

        let latest = store.get_latest_object(bucket.id, "a.txt").await.unwrap().unwrap();
        assert_eq!(latest.version_id, "v2");

        let old = store.get_object_version(bucket.id, "a.txt", "v1").await.unwrap().unwrap();
        assert!(!old.is_latest);
    }

    fn sample_rule(tenant_id: Uuid) -> ReplicationRule {
        ReplicationRule {
            id: Uuid::new_v4(),
            tenant_id,
            source_bucket: "my-bucket".into(),
            destination_external_endpoint: Some("https://dest.example.com".into()),
            destination_external_access_key: Some("AKID".into()),
            destination_external_secret_key: Some("secret".into()),
            destination_node_id: None,
            destination_bucket: "my-bucket-replica".into(),
            prefix_filter: Some("photos/".into()),
            mode: ReplicationMode::Realtime,
            conflict_resolution: ConflictResolution::LastWriteWins,
            replicate_deletes: true,
            replicate_metadata: true,
            priority: 10,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_replication_rule_roundtrip_and_bucket_lookup() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let rule = sample_rule(tenant.id);
        store.create_replication_rule(&rule).await.unwrap();

        let fetched = store.get_replication_rule(rule.id).await.unwrap().unwrap();
        assert_eq!(fetched.source_bucket, "my-bucket");
        assert!(fetched.replicate_deletes);
        assert_eq!(fetched.conflict_resolution, ConflictResolution::LastWriteWins);

        let for_bucket = store.list_replication_rules_for_bucket(tenant.id, "my-bucket").await.unwrap();
        assert_eq!(for_bucket.len(), 1);

        store.set_replication_rule_enabled(rule.id, false).await.unwrap();
        let disabled = store.list_replication_rules_for_bucket(tenant.id, "my-bucket").await.unwrap();
        assert!(disabled.is_empty());
    }

    #[tokio::test]
    async fn test_replication_work_item_claim_is_exclusive() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let rule = sample_rule(tenant.id);
        store.create_replication_rule(&rule).await.unwrap();

        let id = store
            .enqueue_replication_work_item(rule.id, "a.txt", "v1", ReplicationOp::Put)
            .await
            .unwrap();

        let claimed_first = store.claim_replication_work_items(10).await.unwrap();
        assert_eq!(claimed_first, vec![id]);
        let claimed_second = store.claim_replication_work_items(10).await.unwrap();
        assert!(claimed_second.is_empty());

        store.complete_replication_work_item(id).await.unwrap();
        let item = store.get_replication_work_item(id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_multipart_upload_lifecycle() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();

        let upload_id = store
            .create_multipart_upload(bucket.id, "big.bin", user_id, "application/octet-stream", "{}", "STANDARD")
            .await
            .unwrap();

        let upload = store.get_multipart_upload(upload_id).await.unwrap().unwrap();
        assert_eq!(upload.state, UploadState::Initiated);
        assert_eq!(upload.key, "big.bin");

        store.upsert_part(upload_id, 1, 5_242_880, "etag-1").await.unwrap();
        store.upsert_part(upload_id, 2, 1024, "etag-2").await.unwrap();

        let upload = store.get_multipart_upload(upload_id).await.unwrap().unwrap();
        assert_eq!(upload.state, UploadState::PartsUploading);

        let parts = store.list_parts(upload_id).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);

        // Re-uploading part 1 replaces it rather than duplicating.
        store.upsert_part(upload_id, 1, 6_000_000, "etag-1-retry").await.unwrap();
        let parts = store.list_parts(upload_id).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].etag, "etag-1-retry");

        store.finalize_multipart_upload(upload_id, true).await.unwrap();
        let upload = store.get_multipart_upload(upload_id).await.unwrap().unwrap();
        assert_eq!(upload.state, UploadState::Completed);
        assert!(store.list_parts(upload_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replication_status_success_then_failure_keeps_last_success() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let rule = sample_rule(tenant.id);
        store.create_replication_rule(&rule).await.unwrap();

        store.record_replication_success(rule.id, "a.txt", "v1", "abc123", 42).await.unwrap();
        let status = store.get_replication_status(rule.id, "a.txt", "v1").await.unwrap().unwrap();
        assert!(status.replicated_at.is_some());
        assert!(status.error.is_none());

        store.record_replication_failure(rule.id, "a.txt", "v1", "connection refused").await.unwrap();
        let status = store.get_replication_status(rule.id, "a.txt", "v1").await.unwrap().unwrap();
        assert!(status.replicated_at.is_some(), "a prior success timestamp must survive a later failure");
        assert_eq!(status.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_cluster_node_register_and_health_update() {
        let store = test_store().await;
        let node = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: "https://peer-1.internal:9000".into(),
            shared_token: "cluster-secret".into(),
            region: "us-east-1".into(),
            priority: 5,
            health: NodeHealth::Unknown,
            last_health_check: None,
            capacity_bytes: Some(1_000_000_000),
        };
        store.register_cluster_node(&node).await.unwrap();

        let fetched = store.get_cluster_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.health, NodeHealth::Unknown);
        assert!(fetched.last_health_check.is_none());

        store.update_node_health(node.id, NodeHealth::Healthy).await.unwrap();
        let fetched = store.get_cluster_node(node.id).await.unwrap().unwrap();
        assert_eq!(fetched.health, NodeHealth::Healthy);
        assert!(fetched.last_health_check.is_some());

        let nodes = store.list_cluster_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_row_push_and_acknowledge() {
        let store = test_store().await;
        let node = ClusterNode {
            id: Uuid::new_v4(),
            endpoint: "https://peer-1.internal:9000".into(),
            shared_token: "cluster-secret".into(),
            region: "us-east-1".into(),
            priority: 0,
            health: NodeHealth::Unknown,
            last_health_check: None,
            capacity_bytes: None,
        };
        store.register_cluster_node(&node).await.unwrap();

        let entity_id = "tenant:acme";
        store.upsert_sync_row(entity_id, node.id, "checksum-v1").await.unwrap();
        let pending = store.list_unacknowledged_sync_rows(node.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].checksum, "checksum-v1");
        assert!(!pending[0].acknowledged);

        store.acknowledge_sync_row(entity_id, node.id).await.unwrap();
        assert!(store.list_unacknowledged_sync_rows(node.id).await.unwrap().is_empty());

        // A fresh write reopens the row as unacknowledged.
        store.upsert_sync_row(entity_id, node.id, "checksum-v2").await.unwrap();
        let pending = store.list_unacknowledged_sync_rows(node.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].checksum, "checksum-v2");
    }

    #[tokio::test]
    async fn test_inventory_config_due_query_and_run_bookkeeping() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();

        let past = Utc::now() - chrono::Duration::minutes(1);
        let config = store
            .create_inventory_config(bucket.id, "reports-bucket", "inventory/", InventoryFormat::Csv, InventoryFrequency::Daily, "00:00", past)
            .await
            .unwrap();
        assert!(config.enabled);
        assert!(config.last_run_at.is_none());

        let due = store.list_due_inventory_configs(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, config.id);

        let future = Utc::now() + chrono::Duration::days(1);
        store.record_inventory_run(config.id, Utc::now(), future).await.unwrap();
        assert!(store.list_due_inventory_configs(Utc::now()).await.unwrap().is_empty());

        let report = store.create_inventory_report(config.id).await.unwrap();
        assert_eq!(report.status, InventoryReportStatus::Pending);
        store.complete_inventory_report(report.id, 42, "inventory/report.csv").await.unwrap();

        let reports = store.list_inventory_reports_for_config(config.id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, InventoryReportStatus::Completed);
        assert_eq!(reports[0].object_count, 42);
        assert_eq!(reports[0].report_key.as_deref(), Some("inventory/report.csv"));

        store.set_inventory_config_enabled(config.id, false).await.unwrap();
        assert!(store.get_inventory_config(config.id).await.unwrap().unwrap().enabled.then_some(()).is_none());
    }

    #[tokio::test]
    async fn test_inventory_report_failure_records_error() {
        let store = test_store().await;
        let tenant = store.create_tenant("acme").await.unwrap();
        let user_id = store.create_user(tenant.id, "alice", None, &["admin".into()]).await.unwrap();
        let bucket = store.create_bucket(tenant.id, "my-bucket", user_id).await.unwrap();
        let config = store
            .create_inventory_config(bucket.id, "reports-bucket", "", InventoryFormat::Json, InventoryFrequency::Weekly, "03:30", Utc::now())
            .await
            .unwrap();

        let report = store.create_inventory_report(config.id).await.unwrap();
        store.fail_inventory_report(report.id, "destination bucket vanished").await.unwrap();

        let reports = store.list_inventory_reports_for_config(config.id).await.unwrap();
        assert_eq!(reports[0].status, InventoryReportStatus::Failed);
        assert_eq!(reports[0].error.as_deref(), Some("destination bucket vanished"));
    }

    #[tokio::test]
    async fn test_tombstone_record_and_list_since() {
        let store = test_store().await;
        let node_id = Uuid::new_v4();
        let before = Utc::now() - chrono::Duration::seconds(5);

        store.record_tombstone("bucket", "my-bucket", node_id).await.unwrap();
        // Duplicate tombstone for the same entity is ignored, not an error.
        store.record_tombstone("bucket", "my-bucket", node_id).await.unwrap();

        let tombstones = store.list_tombstones_since(before).await.unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].entity_id, "my-bucket");
        assert_eq!(tombstones[0].deleted_by_node, node_id);

        let future = Utc::now() + chrono::Duration::seconds(5);
        assert!(store.list_tombstones_since(future).await.unwrap().is_empty());

        let purged = store.purge_old_tombstones(chrono::Duration::seconds(0)).await.unwrap();
        assert_eq!(purged, 1);
    }
}
