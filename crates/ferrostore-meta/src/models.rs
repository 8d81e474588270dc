//! Plain domain structs for the entities listed in SPEC_FULL §3.
//!
//! These are the in-memory shape the store hands back to callers; wire/XML
//! representations live in `ferrostore-s3`, JSON-column payloads (policy,
//! ACL, lifecycle, CORS, object-lock config) are concrete types per §3a.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub status: TenantStatus,
    pub max_access_keys: i64,
    pub max_storage_bytes: i64,
    pub max_buckets: i64,
    pub current_access_keys: i64,
    pub current_storage_bytes: i64,
    pub current_buckets: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub roles: Vec<String>,
    pub status: UserStatus,
    pub failed_login_attempts: i64,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub totp_secret: Option<String>,
    pub totp_backup_codes: Vec<String>,
    pub auth_provider: String,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VersioningState {
    Unversioned,
    Enabled,
    Suspended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bucket {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub versioning: VersioningState,
    pub policy_json: Option<String>,
    pub cors_json: Option<String>,
    pub lifecycle_json: Option<String>,
    pub tags_json: Option<String>,
    pub object_lock_json: Option<String>,
    pub acl_json: Option<String>,
    pub object_count: i64,
    pub current_storage_bytes: i64,
    pub deleting: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetentionMode {
    Governance,
    Compliance,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub bucket_id: Uuid,
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub size: i64,
    pub etag: String,
    pub content_type: String,
    pub storage_class: String,
    pub metadata_json: String,
    pub tags_json: Option<String>,
    pub retention_mode: Option<RetentionMode>,
    pub retain_until: Option<DateTime<Utc>>,
    pub legal_hold: bool,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum UploadState {
    Initiated,
    PartsUploading,
    Completed,
    Aborted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub upload_id: Uuid,
    pub bucket_id: Uuid,
    pub key: String,
    pub initiator_user_id: Uuid,
    pub state: UploadState,
    pub content_type: String,
    pub metadata_json: String,
    pub storage_class: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartRecord {
    pub upload_id: Uuid,
    pub part_number: i32,
    pub size: i64,
    pub etag: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Share {
    pub token: String,
    pub tenant_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub access_key_id: String,
    pub secret_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    Realtime,
    Scheduled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LastWriteWins,
    SourceWins,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_bucket: String,
    pub destination_external_endpoint: Option<String>,
    pub destination_external_access_key: Option<String>,
    pub destination_external_secret_key: Option<String>,
    pub destination_node_id: Option<Uuid>,
    pub destination_bucket: String,
    pub prefix_filter: Option<String>,
    pub mode: ReplicationMode,
    pub conflict_resolution: ConflictResolution,
    pub replicate_deletes: bool,
    pub replicate_metadata: bool,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationOp {
    Put,
    Delete,
    Metadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkItemStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationWorkItem {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub object_key: String,
    pub version_id: String,
    pub op: ReplicationOp,
    pub status: WorkItemStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationStatusRow {
    pub rule_id: Uuid,
    pub object_key: String,
    pub version_id: String,
    pub etag: Option<String>,
    pub size: Option<i64>,
    pub replicated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: Uuid,
    pub endpoint: String,
    pub shared_token: String,
    pub region: String,
    pub priority: i32,
    pub health: NodeHealth,
    pub last_health_check: Option<DateTime<Utc>>,
    pub capacity_bytes: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletionTombstone {
    pub entity_type: String,
    pub entity_id: String,
    pub deleted_by_node: Uuid,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRow {
    pub entity_id: String,
    pub destination_node: Uuid,
    pub checksum: String,
    pub acknowledged: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketPermission {
    pub bucket_id: Uuid,
    pub grantee_type: String,
    pub grantee_id: String,
    pub actions: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryFrequency {
    Daily,
    Weekly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryFormat {
    Csv,
    Json,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub id: Uuid,
    pub bucket_id: Uuid,
    pub destination_bucket: String,
    pub destination_prefix: String,
    pub format: InventoryFormat,
    pub frequency: InventoryFrequency,
    /// Time of day the schedule fires, `HH:MM` in UTC.
    pub schedule_time: String,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryReportStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryReport {
    pub id: Uuid,
    pub config_id: Uuid,
    pub status: InventoryReportStatus,
    pub object_count: i64,
    pub report_key: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub status: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub details_json: Option<String>,
}
