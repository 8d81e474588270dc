//! ferrostore Gateway - S3 API Gateway
//!
//! This binary provides the S3-compatible HTTP API (§4), the Prometheus
//! metrics endpoint (§6a), and the background loops that keep inventory
//! reports, replication, cluster health, and retention current
//! (§4.9/§4.10/§4.11/§4.12).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use ferrostore_auth::{AuthManager, AuthUserStore};
use ferrostore_common::concurrency::KeyedMutexRegistry;
use ferrostore_common::config::Config;
use ferrostore_common::path::PathSandbox;
use ferrostore_cluster::HealthProber;
use ferrostore_inventory::InventoryWorker;
use ferrostore_meta::schema::{audit_migrations, metadata_migrations};
use ferrostore_meta::{AuditStore, MetaStore, Migrator};
use ferrostore_replication::ReplicationDispatcher;
use ferrostore_s3::auth::RequestAuthenticator;
use ferrostore_s3::{build_router, s3_metrics, S3State};
use ferrostore_storage::FilesystemBackend;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ferrostore-gateway")]
#[command(about = "ferrostore S3 API Gateway")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML), layered over built-in defaults and
    /// `FERROSTORE__*` environment overrides.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

async fn metrics_handler() -> impl IntoResponse {
    let body = s3_metrics().export_prometheus();
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body)
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn open_pool(path: PathBuf) -> Result<sqlx::SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| format!("creating {}", parent.display()))?;
    }
    let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
    SqlitePoolOptions::new().max_connections(16).connect_with(options).await.with_context(|| format!("opening {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    info!(node = %config.node.name, data_dir = %config.node.data_dir.display(), "starting ferrostore gateway");

    tokio::fs::create_dir_all(&config.storage.root_dir)
        .await
        .with_context(|| format!("creating storage root {}", config.storage.root_dir.display()))?;

    let metadata_pool = open_pool(config.node.data_dir.join("metadata.db")).await?;
    let metadata_migrator = Migrator::new(metadata_pool.clone(), metadata_migrations());
    metadata_migrator.migrate().await.context("applying metadata migrations")?;

    let audit_pool = open_pool(config.node.data_dir.join("audit.db")).await?;
    let audit_migrator = Migrator::new(audit_pool.clone(), audit_migrations());
    audit_migrator.migrate().await.context("applying audit migrations")?;

    let meta = Arc::new(MetaStore::new(metadata_pool));
    let audit = Arc::new(AuditStore::new(audit_pool));

    let storage = Arc::new(FilesystemBackend::new(config.storage.root_dir.clone()));
    let sandbox = PathSandbox::new(config.storage.root_dir.clone());

    let user_store = Arc::new(AuthUserStore::new(Arc::clone(&meta)));
    let auth_manager = AuthManager::new(Arc::clone(&meta));
    let authenticator = RequestAuthenticator::new(Arc::clone(&user_store), auth_manager, config.s3.region.clone());

    let replication = Arc::new(ReplicationDispatcher::new(
        Arc::clone(&meta),
        Arc::clone(&storage),
        sandbox.clone(),
        config.replication.clone(),
    ));
    let shutdown = CancellationToken::new();
    let replication_workers = Arc::clone(&replication).spawn_workers(shutdown.clone());

    let health_prober = Arc::new(HealthProber::new(Arc::clone(&meta), config.cluster.max_consecutive_failures));
    let probe_interval = Duration::from_secs(config.cluster.heartbeat_interval_secs.max(1));
    let probe_handle = {
        let health_prober = Arc::clone(&health_prober);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(probe_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = health_prober.probe_all().await {
                            tracing::warn!(error = %e, "cluster health probe pass failed");
                        }
                    }
                }
            }
        })
    };

    let audit_retention_days = i64::from(config.audit.retention_days);
    let audit_cleanup_interval = Duration::from_secs(config.audit.cleanup_interval_secs.max(1));
    let audit_handle = {
        let audit = Arc::clone(&audit);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(audit_cleanup_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match audit.purge_older_than(audit_retention_days).await {
                            Ok(removed) if removed > 0 => info!(removed, "purged expired audit log rows"),
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "audit retention purge failed"),
                        }
                    }
                }
            }
        })
    };

    let tombstone_retention = chrono::Duration::days(config.cluster.tombstone_retention_days);
    let tombstone_handle = {
        let meta = Arc::clone(&meta);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(audit_cleanup_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match meta.purge_old_tombstones(tombstone_retention).await {
                            Ok(removed) if removed > 0 => info!(removed, "purged expired deletion tombstones"),
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "tombstone purge failed"),
                        }
                    }
                }
            }
        })
    };

    let inventory_worker = Arc::new(InventoryWorker::new(
        Arc::clone(&meta),
        Arc::clone(&storage),
        sandbox.clone(),
        config.inventory.clone(),
    ));
    let inventory_handle = Arc::clone(&inventory_worker).spawn(shutdown.clone());

    let state = Arc::new(S3State {
        meta,
        storage,
        sandbox,
        auth: authenticator,
        replication,
        s3_config: config.s3.clone(),
        multipart_config: config.multipart.clone(),
        locks: KeyedMutexRegistry::new(),
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .merge(build_router(state))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.network.s3_listen).await.with_context(|| format!("binding {}", config.network.s3_listen))?;
    info!(addr = %config.network.s3_listen, "S3 API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("serving S3 API")?;

    for handle in replication_workers {
        let _ = handle.await;
    }
    let _ = probe_handle.await;
    let _ = audit_handle.await;
    let _ = tombstone_handle.await;
    let _ = inventory_handle.await;

    info!("gateway shut down gracefully");
    Ok(())
}
