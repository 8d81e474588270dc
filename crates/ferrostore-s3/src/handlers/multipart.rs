//! Multipart upload lifecycle (§4.6, §5): Initiate/UploadPart/Complete/Abort/ListParts.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ferrostore_meta::models::{ObjectRecord, ReplicationOp, UploadState};
use md5::{Digest, Md5};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::handlers::load_bucket;
use crate::routing::RequestCtx;
use crate::xml;

fn header_str<'a>(ctx: &'a RequestCtx, name: &str) -> Option<&'a str> {
    ctx.headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn initiate(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObject").await?;

    let content_type = header_str(&ctx, "content-type").unwrap_or("application/octet-stream").to_string();
    let custom: HashMap<String, String> = ctx
        .headers
        .iter()
        .filter_map(|(name, value)| {
            let stripped = name.as_str().strip_prefix("x-amz-meta-")?;
            Some((stripped.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();
    let storage_class = header_str(&ctx, "x-amz-storage-class").unwrap_or("STANDARD").to_string();
    let metadata_json = serde_json::to_string(&custom).unwrap_or_default();

    let upload_id = ctx
        .state
        .meta
        .create_multipart_upload(bucket.id, &ctx.key, ctx.auth.user_id, &content_type, &metadata_json, &storage_class)
        .await?;

    let body = xml::InitiateMultipartUploadResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        bucket: bucket.name,
        key: ctx.key,
        upload_id: upload_id.to_string(),
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

async fn load_upload(ctx: &RequestCtx, bucket_id: uuid::Uuid, upload_id: Uuid) -> ApiResult<ferrostore_meta::models::MultipartUpload> {
    let upload = ctx
        .state
        .meta
        .get_multipart_upload(upload_id)
        .await?
        .ok_or_else(|| ferrostore_common::Error::NoSuchUpload { upload_id: upload_id.to_string() })?;
    if upload.bucket_id != bucket_id || upload.key != ctx.key {
        return Err(ferrostore_common::Error::NoSuchUpload { upload_id: upload_id.to_string() }.into());
    }
    Ok(upload)
}

fn parse_upload_id(ctx: &RequestCtx) -> ApiResult<Uuid> {
    let raw = ctx.query.get("uploadId").ok_or_else(|| ferrostore_common::Error::invalid_request("missing uploadId"))?;
    Uuid::parse_str(raw).map_err(|_| ferrostore_common::Error::NoSuchUpload { upload_id: raw.clone() }.into())
}

pub async fn upload_part(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObject").await?;

    let upload_id = parse_upload_id(&ctx)?;
    let _upload = load_upload(&ctx, bucket.id, upload_id).await?;
    let part_number: i32 = ctx
        .query
        .get("partNumber")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ferrostore_common::Error::invalid_request("missing or invalid partNumber"))?;
    if !(1..=(ctx.state.multipart_config.max_parts as i32)).contains(&part_number) {
        return Err(ferrostore_common::Error::InvalidPart { part_number }.into());
    }

    if ctx.body.len() as u64 > ctx.state.multipart_config.max_part_size {
        return Err(ferrostore_common::Error::EntityTooLarge { max_size: ctx.state.multipart_config.max_part_size }.into());
    }

    let tenant_id = bucket.tenant_id.to_string();
    let path = ctx.state.sandbox.multipart_part_path(&tenant_id, &ctx.bucket, &upload_id.to_string(), part_number)?;
    let metadata = ctx
        .state
        .storage
        .put(&path, false, ctx.body.as_ref(), None, HashMap::new())
        .await
        .map_err(ferrostore_common::Error::from)?;
    ctx.state.meta.upsert_part(upload_id, part_number, metadata.size as i64, &metadata.etag).await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::ETAG, HeaderValue::from_str(&format!("\"{}\"", metadata.etag)).unwrap_or(HeaderValue::from_static("")))
        .body(Body::empty())
        .unwrap_or_default())
}

pub async fn list_parts(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:ListMultipartUploadParts").await?;

    let upload_id = parse_upload_id(&ctx)?;
    load_upload(&ctx, bucket.id, upload_id).await?;
    let parts = ctx.state.meta.list_parts(upload_id).await?;

    let body = xml::ListPartsResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        bucket: bucket.name,
        key: ctx.key,
        upload_id: upload_id.to_string(),
        is_truncated: false,
        parts: parts
            .into_iter()
            .map(|p| xml::PartEntry { part_number: p.part_number, last_modified: p.uploaded_at, etag: format!("\"{}\"", p.etag), size: p.size })
            .collect(),
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

pub async fn abort(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:AbortMultipartUpload").await?;

    let upload_id = parse_upload_id(&ctx)?;
    load_upload(&ctx, bucket.id, upload_id).await?;

    let parts = ctx.state.meta.list_parts(upload_id).await?;
    let tenant_id = bucket.tenant_id.to_string();
    for part in &parts {
        if let Ok(path) = ctx.state.sandbox.multipart_part_path(&tenant_id, &ctx.bucket, &upload_id.to_string(), part.part_number) {
            let _ = ctx.state.storage.delete(&path).await;
        }
    }
    ctx.state.meta.finalize_multipart_upload(upload_id, false).await?;
    Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap_or_default())
}

pub async fn complete(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObject").await?;

    let upload_id = parse_upload_id(&ctx)?;
    let upload = load_upload(&ctx, bucket.id, upload_id).await?;
    if upload.state == UploadState::Completed || upload.state == UploadState::Aborted {
        return Err(ferrostore_common::Error::NoSuchUpload { upload_id: upload_id.to_string() }.into());
    }

    let request: xml::CompleteMultipartUploadRequest = quick_xml::de::from_str(&String::from_utf8_lossy(&ctx.body))
        .map_err(|e| ferrostore_common::Error::invalid_request(e.to_string()))?;
    if request.part.is_empty() {
        return Err(ferrostore_common::Error::invalid_request("no parts supplied").into());
    }

    let stored_parts = ctx.state.meta.list_parts(upload_id).await?;
    let stored: HashMap<i32, &ferrostore_meta::models::PartRecord> = stored_parts.iter().map(|p| (p.part_number, p)).collect();

    let mut last_part_number = 0;
    let mut total_size: i64 = 0;
    let mut etag_concat = Vec::new();
    let last_requested_part_number = request.part.last().map(|p| p.part_number);
    for requested in &request.part {
        if requested.part_number <= last_part_number {
            return Err(ferrostore_common::Error::InvalidPartOrder.into());
        }
        last_part_number = requested.part_number;
        let stored_part = stored
            .get(&requested.part_number)
            .ok_or(ferrostore_common::Error::InvalidPart { part_number: requested.part_number })?;
        let requested_etag = requested.etag.trim_matches('"');
        if stored_part.etag != requested_etag {
            return Err(ferrostore_common::Error::invalid_request(format!("ETag mismatch for part {}", requested.part_number)).into());
        }
        if Some(requested.part_number) != last_requested_part_number && stored_part.size < ctx.state.multipart_config.min_part_size as i64 {
            return Err(ferrostore_common::Error::EntityTooSmall { min_size: ctx.state.multipart_config.min_part_size }.into());
        }
        total_size += stored_part.size;
        let digest = hex::decode(&stored_part.etag)
            .map_err(|_| ferrostore_common::Error::internal("stored part ETag is not valid hex"))?;
        etag_concat.extend_from_slice(&digest);
    }

    let lock_key = format!("{}/{}", ctx.bucket, ctx.key);
    let _guard = ctx.state.locks.lock(&lock_key).await;

    ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, total_size).await?;

    let tenant_id = bucket.tenant_id.to_string();
    let versioning_enabled = bucket.versioning == ferrostore_meta::models::VersioningState::Enabled;
    let version_id = if versioning_enabled { Uuid::new_v4().to_string() } else { "null".to_string() };
    let dest_path = ctx.state.sandbox.object_path(&tenant_id, &ctx.bucket, &format!("{}@{}", ctx.key, version_id))?;

    if let Some(parent) = dest_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let mut dest_file = match tokio::fs::File::create(&dest_path).await {
        Ok(f) => f,
        Err(e) => {
            let _ = ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, -total_size).await;
            return Err(ferrostore_common::Error::from(e).into());
        }
    };
    use tokio::io::AsyncWriteExt;
    for requested in &request.part {
        let part_path = ctx.state.sandbox.multipart_part_path(&tenant_id, &ctx.bucket, &upload_id.to_string(), requested.part_number)?;
        let mut part_file = tokio::fs::File::open(&part_path).await.map_err(ferrostore_common::Error::from)?;
        tokio::io::copy(&mut part_file, &mut dest_file).await.map_err(ferrostore_common::Error::from)?;
    }
    dest_file.flush().await.map_err(ferrostore_common::Error::from)?;
    drop(dest_file);

    let mut hasher = Md5::new();
    hasher.update(&etag_concat);
    let composite_etag = format!("{}-{}", hex::encode(hasher.finalize()), request.part.len());

    if !versioning_enabled {
        let _ = ctx.state.meta.delete_object_version(bucket.id, &ctx.key, "null").await;
    }

    let record = ObjectRecord {
        bucket_id: bucket.id,
        key: ctx.key.clone(),
        version_id: version_id.clone(),
        is_latest: true,
        is_delete_marker: false,
        size: total_size,
        etag: composite_etag.clone(),
        content_type: upload.content_type.clone(),
        storage_class: upload.storage_class.clone(),
        metadata_json: upload.metadata_json.clone(),
        tags_json: None,
        retention_mode: None,
        retain_until: None,
        legal_hold: false,
        last_modified: chrono::Utc::now(),
    };
    if let Err(e) = ctx.state.meta.put_object(bucket.id, &record).await {
        let _ = tokio::fs::remove_file(&dest_path).await;
        let _ = ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, -total_size).await;
        return Err(e.into());
    }

    for part in &stored_parts {
        if let Ok(path) = ctx.state.sandbox.multipart_part_path(&tenant_id, &ctx.bucket, &upload_id.to_string(), part.part_number) {
            let _ = ctx.state.storage.delete(&path).await;
        }
    }
    ctx.state.meta.finalize_multipart_upload(upload_id, true).await?;
    let _ = ctx.state.meta.adjust_bucket_counters(&ctx.bucket, 1, total_size).await;
    ctx.state
        .replication
        .enqueue_for_mutation(bucket.tenant_id, &ctx.bucket, &ctx.key, &version_id, ReplicationOp::Put)
        .await;

    let body = xml::CompleteMultipartUploadResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        location: format!("/{}/{}", ctx.bucket, ctx.key),
        bucket: ctx.bucket,
        key: ctx.key.clone(),
        etag: format!("\"{composite_etag}\""),
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_order_detects_duplicates_and_gaps_as_non_monotonic() {
        let numbers = [1, 2, 2];
        let mut last = 0;
        let mut saw_violation = false;
        for n in numbers {
            if n <= last {
                saw_violation = true;
            }
            last = n;
        }
        assert!(saw_violation);
    }

    #[test]
    fn test_min_part_size_skips_only_the_last_part() {
        let min_size = 5 * 1024 * 1024;
        let sizes = [(1, min_size), (2, min_size - 1), (3, 10)];
        let last_part_number = sizes.last().map(|(n, _)| *n);
        let mut rejected = None;
        for (part_number, size) in sizes {
            if Some(part_number) != last_part_number && size < min_size {
                rejected = Some(part_number);
                break;
            }
        }
        assert_eq!(rejected, Some(2));
    }

    #[test]
    fn test_min_part_size_allows_small_last_part() {
        let min_size = 5 * 1024 * 1024;
        let sizes = [(1, min_size), (2, 10)];
        let last_part_number = sizes.last().map(|(n, _)| *n);
        let mut rejected = None;
        for (part_number, size) in sizes {
            if Some(part_number) != last_part_number && size < min_size {
                rejected = Some(part_number);
                break;
            }
        }
        assert_eq!(rejected, None);
    }
}
