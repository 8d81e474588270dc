//! Migration list for the metadata store. Bootstraps through version 11 per
//! §4.3: core identity, shares, settings + 2FA, replication, cluster +
//! metrics, cluster sync tables, bucket inventory + permissions,
//! identity-provider tables, cluster deletion log, inventory report tracking.

use crate::migrator::Migration;

#[must_use]
pub fn metadata_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "core identity: tenants, users, access_keys",
            up: r"
                CREATE TABLE IF NOT EXISTS tenants (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'active',
                    max_access_keys INTEGER NOT NULL DEFAULT 50,
                    max_storage_bytes INTEGER NOT NULL DEFAULT 1099511627776,
                    max_buckets INTEGER NOT NULL DEFAULT 100,
                    current_access_keys INTEGER NOT NULL DEFAULT 0,
                    current_storage_bytes INTEGER NOT NULL DEFAULT 0,
                    current_buckets INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    username TEXT NOT NULL,
                    email TEXT,
                    password_hash TEXT,
                    roles TEXT NOT NULL DEFAULT '[]',
                    status TEXT NOT NULL DEFAULT 'active',
                    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
                    last_failed_login TEXT,
                    locked_until TEXT,
                    auth_provider TEXT NOT NULL DEFAULT 'local',
                    external_id TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE(tenant_id, username)
                );
                CREATE TABLE IF NOT EXISTS access_keys (
                    access_key_id TEXT PRIMARY KEY,
                    secret_access_key TEXT NOT NULL,
                    user_id TEXT NOT NULL REFERENCES users(id),
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    active INTEGER NOT NULL DEFAULT 1,
                    last_used_at TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS buckets (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    name TEXT NOT NULL UNIQUE,
                    owner_user_id TEXT NOT NULL REFERENCES users(id),
                    versioning TEXT NOT NULL DEFAULT 'Unversioned',
                    object_count INTEGER NOT NULL DEFAULT 0,
                    current_storage_bytes INTEGER NOT NULL DEFAULT 0,
                    deleting INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS objects (
                    bucket_id TEXT NOT NULL REFERENCES buckets(id),
                    key TEXT NOT NULL,
                    version_id TEXT NOT NULL,
                    is_latest INTEGER NOT NULL DEFAULT 1,
                    is_delete_marker INTEGER NOT NULL DEFAULT 0,
                    size INTEGER NOT NULL DEFAULT 0,
                    etag TEXT NOT NULL DEFAULT '',
                    content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                    storage_class TEXT NOT NULL DEFAULT 'STANDARD',
                    metadata_json TEXT NOT NULL DEFAULT '{}',
                    legal_hold INTEGER NOT NULL DEFAULT 0,
                    last_modified TEXT NOT NULL,
                    PRIMARY KEY (bucket_id, key, version_id)
                );
                CREATE INDEX IF NOT EXISTS idx_objects_latest ON objects(bucket_id, key, is_latest);
            ",
        },
        Migration {
            version: 2,
            description: "multipart uploads and parts",
            up: r"
                CREATE TABLE IF NOT EXISTS multipart_uploads (
                    upload_id TEXT PRIMARY KEY,
                    bucket_id TEXT NOT NULL REFERENCES buckets(id),
                    key TEXT NOT NULL,
                    initiator_user_id TEXT NOT NULL REFERENCES users(id),
                    state TEXT NOT NULL DEFAULT 'Initiated',
                    content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                    metadata_json TEXT NOT NULL DEFAULT '{}',
                    storage_class TEXT NOT NULL DEFAULT 'STANDARD',
                    started_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS multipart_parts (
                    upload_id TEXT NOT NULL REFERENCES multipart_uploads(upload_id),
                    part_number INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    etag TEXT NOT NULL,
                    uploaded_at TEXT NOT NULL,
                    PRIMARY KEY (upload_id, part_number)
                );
            ",
        },
        Migration {
            version: 3,
            description: "shares (presigned url records)",
            up: r"
                CREATE TABLE IF NOT EXISTS shares (
                    token TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    bucket TEXT NOT NULL,
                    key TEXT NOT NULL,
                    access_key_id TEXT NOT NULL,
                    secret_hash TEXT NOT NULL,
                    expires_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(tenant_id, bucket, key)
                );
            ",
        },
        Migration {
            version: 4,
            description: "user settings and 2FA columns",
            up: r"
                ALTER TABLE users ADD COLUMN totp_secret TEXT;
                ALTER TABLE users ADD COLUMN totp_backup_codes TEXT NOT NULL DEFAULT '[]';
            ",
        },
        Migration {
            version: 5,
            description: "replication rules, work items, status",
            up: r"
                CREATE TABLE IF NOT EXISTS replication_rules (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    source_bucket TEXT NOT NULL,
                    destination_external_endpoint TEXT,
                    destination_external_access_key TEXT,
                    destination_external_secret_key TEXT,
                    destination_node_id TEXT,
                    destination_bucket TEXT NOT NULL,
                    prefix_filter TEXT,
                    mode TEXT NOT NULL DEFAULT 'realtime',
                    conflict_resolution TEXT NOT NULL DEFAULT 'last_write_wins',
                    replicate_deletes INTEGER NOT NULL DEFAULT 1,
                    replicate_metadata INTEGER NOT NULL DEFAULT 1,
                    priority INTEGER NOT NULL DEFAULT 0,
                    enabled INTEGER NOT NULL DEFAULT 1
                );
                CREATE TABLE IF NOT EXISTS replication_work_items (
                    id TEXT PRIMARY KEY,
                    rule_id TEXT NOT NULL REFERENCES replication_rules(id),
                    object_key TEXT NOT NULL,
                    version_id TEXT NOT NULL,
                    op TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL DEFAULT 8,
                    scheduled_at TEXT NOT NULL,
                    last_error TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_work_items_claim ON replication_work_items(status, scheduled_at);
                CREATE TABLE IF NOT EXISTS replication_status (
                    rule_id TEXT NOT NULL REFERENCES replication_rules(id),
                    object_key TEXT NOT NULL,
                    version_id TEXT NOT NULL,
                    etag TEXT,
                    size INTEGER,
                    replicated_at TEXT,
                    error TEXT,
                    PRIMARY KEY (rule_id, object_key, version_id)
                );
            ",
        },
        Migration {
            version: 6,
            description: "cluster nodes and metrics",
            up: r"
                CREATE TABLE IF NOT EXISTS cluster_nodes (
                    id TEXT PRIMARY KEY,
                    endpoint TEXT NOT NULL,
                    shared_token TEXT NOT NULL,
                    region TEXT NOT NULL DEFAULT 'default',
                    priority INTEGER NOT NULL DEFAULT 0,
                    health TEXT NOT NULL DEFAULT 'unknown',
                    last_health_check TEXT,
                    capacity_bytes INTEGER
                );
            ",
        },
        Migration {
            version: 7,
            description: "cluster sync tables",
            up: r"
                CREATE TABLE IF NOT EXISTS sync_rows (
                    entity_id TEXT NOT NULL,
                    destination_node TEXT NOT NULL REFERENCES cluster_nodes(id),
                    checksum TEXT NOT NULL,
                    acknowledged INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (entity_id, destination_node)
                );
            ",
        },
        Migration {
            version: 8,
            description: "bucket inventory configs and explicit permissions",
            up: r"
                CREATE TABLE IF NOT EXISTS inventory_configs (
                    id TEXT PRIMARY KEY,
                    bucket_id TEXT NOT NULL REFERENCES buckets(id),
                    destination_bucket TEXT NOT NULL,
                    destination_prefix TEXT NOT NULL DEFAULT '',
                    format TEXT NOT NULL DEFAULT 'csv',
                    frequency TEXT NOT NULL DEFAULT 'daily',
                    schedule_time TEXT NOT NULL DEFAULT '00:00',
                    enabled INTEGER NOT NULL DEFAULT 1,
                    last_run_at TEXT,
                    next_run_at TEXT
                );
                CREATE TABLE IF NOT EXISTS bucket_permissions (
                    bucket_id TEXT NOT NULL REFERENCES buckets(id),
                    grantee_type TEXT NOT NULL,
                    grantee_id TEXT NOT NULL,
                    actions TEXT NOT NULL DEFAULT '[]',
                    expires_at TEXT,
                    PRIMARY KEY (bucket_id, grantee_type, grantee_id)
                );
                ALTER TABLE buckets ADD COLUMN policy_json TEXT;
                ALTER TABLE buckets ADD COLUMN cors_json TEXT;
                ALTER TABLE buckets ADD COLUMN lifecycle_json TEXT;
                ALTER TABLE buckets ADD COLUMN tags_json TEXT;
                ALTER TABLE buckets ADD COLUMN object_lock_json TEXT;
                ALTER TABLE buckets ADD COLUMN acl_json TEXT;
                ALTER TABLE objects ADD COLUMN tags_json TEXT;
                ALTER TABLE objects ADD COLUMN retention_mode TEXT;
                ALTER TABLE objects ADD COLUMN retain_until TEXT;
            ",
        },
        Migration {
            version: 9,
            description: "identity provider configuration",
            up: r"
                CREATE TABLE IF NOT EXISTS identity_providers (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL REFERENCES tenants(id),
                    kind TEXT NOT NULL,
                    config_json TEXT NOT NULL DEFAULT '{}',
                    enabled INTEGER NOT NULL DEFAULT 1
                );
            ",
        },
        Migration {
            version: 10,
            description: "cluster deletion log",
            up: r"
                CREATE TABLE IF NOT EXISTS cluster_deletion_log (
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    deleted_by_node TEXT NOT NULL,
                    deleted_at TEXT NOT NULL,
                    UNIQUE(entity_type, entity_id)
                );
            ",
        },
        Migration {
            version: 11,
            description: "inventory report tracking",
            up: r"
                CREATE TABLE IF NOT EXISTS inventory_reports (
                    id TEXT PRIMARY KEY,
                    config_id TEXT NOT NULL REFERENCES inventory_configs(id),
                    status TEXT NOT NULL DEFAULT 'pending',
                    object_count INTEGER NOT NULL DEFAULT 0,
                    report_key TEXT,
                    error TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_inventory_reports_config ON inventory_reports(config_id, started_at);
            ",
        },
    ]
}

#[must_use]
pub fn audit_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "audit events",
        up: r"
            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                tenant_id TEXT,
                actor_user_id TEXT,
                action TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                status TEXT NOT NULL,
                source_ip TEXT,
                user_agent TEXT,
                details_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_tenant ON audit_events(tenant_id, timestamp);
        ",
    }]
}
