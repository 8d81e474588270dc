//! Object operations (§4.6): Put/Get/Head/Delete/Copy, tagging, ACL,
//! retention and legal hold, and the batch `POST ?delete`.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use ferrostore_common::types::ObjectKey;
use ferrostore_meta::models::{ObjectRecord, RetentionMode, ReplicationOp, VersioningState};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::load_bucket;
use crate::routing::RequestCtx;
use crate::xml;

const UNVERSIONED_ID: &str = "null";

/// Parsed `Range` header (inclusive byte bounds).
#[derive(Debug, Clone, Copy)]
struct ByteRange {
    start: u64,
    end: u64,
}

/// Parse `bytes=N-M` / `bytes=N-` / `bytes=-N`. Returns `None` for a header
/// the backend can't satisfy (caller turns that into 416), as opposed to a
/// header that's simply absent.
fn parse_range_header(range_header: &str, total_size: u64) -> Option<ByteRange> {
    let range_header = range_header.trim();
    let range_spec = range_header.strip_prefix("bytes=")?;
    let parts: Vec<&str> = range_spec.split('-').collect();
    if parts.len() != 2 {
        return None;
    }

    let start_str = parts[0].trim();
    let end_str = parts[1].trim();
    if start_str.is_empty() && end_str.is_empty() {
        return None;
    }

    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        let suffix_len = suffix_len.min(total_size);
        return Some(ByteRange { start: total_size - suffix_len, end: total_size - 1 });
    }

    let start: u64 = start_str.parse().ok()?;
    if end_str.is_empty() {
        if start >= total_size {
            return None;
        }
        return Some(ByteRange { start, end: total_size - 1 });
    }

    let end: u64 = end_str.parse().ok()?;
    if start > end || start >= total_size {
        return None;
    }
    Some(ByteRange { start, end: end.min(total_size - 1) })
}

fn http_date(ts: chrono::DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn etag_matches(header_value: &str, etag: &str) -> bool {
    header_value.split(',').map(|v| v.trim().trim_matches('"')).any(|v| v == "*" || v == etag)
}

/// Evaluate the four conditional-request headers against the stored record,
/// per §4.6: `If-Match`/`If-Unmodified-Since` take priority and fail the
/// request with 412 before `If-None-Match`/`If-Modified-Since` can short
/// the response to 304.
fn check_preconditions(headers: &HeaderMap, etag: &str, last_modified: chrono::DateTime<Utc>) -> ApiResult<Option<StatusCode>> {
    if let Some(if_match) = header_str(headers, "if-match")
        && !etag_matches(if_match, etag)
    {
        return Err(ferrostore_common::Error::PreconditionFailed.into());
    }
    if let Some(since) = header_str(headers, "if-unmodified-since")
        && let Ok(since) = chrono::DateTime::parse_from_rfc2822(since)
        && last_modified > since
    {
        return Err(ferrostore_common::Error::PreconditionFailed.into());
    }
    if let Some(if_none_match) = header_str(headers, "if-none-match")
        && etag_matches(if_none_match, etag)
    {
        return Ok(Some(StatusCode::NOT_MODIFIED));
    }
    if let Some(since) = header_str(headers, "if-modified-since")
        && let Ok(since) = chrono::DateTime::parse_from_rfc2822(since)
        && last_modified <= since
    {
        return Ok(Some(StatusCode::NOT_MODIFIED));
    }
    Ok(None)
}

fn quoted(etag: &str) -> String {
    format!("\"{etag}\"")
}

fn unquoted(etag: &str) -> &str {
    etag.trim_matches('"')
}

fn user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str();
            let stripped = name.strip_prefix("x-amz-meta-")?;
            let value = value.to_str().ok()?;
            Some((stripped.to_string(), value.to_string()))
        })
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn put_object(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObject").await?;
    ObjectKey::parse(ctx.key.clone()).map_err(ferrostore_common::Error::from)?;

    let size = ctx.body.len() as u64;
    if size > ctx.state.s3_config.max_object_size {
        return Err(ferrostore_common::Error::EntityTooLarge { max_size: ctx.state.s3_config.max_object_size }.into());
    }

    let lock_key = format!("{}/{}", ctx.bucket, ctx.key);
    let _guard = ctx.state.locks.lock(&lock_key).await;

    let existing = ctx.state.meta.get_latest_object(bucket.id, &ctx.key).await?;
    let versioning_enabled = bucket.versioning == VersioningState::Enabled;
    let version_id = if versioning_enabled { Uuid::new_v4().to_string() } else { UNVERSIONED_ID.to_string() };

    let tenant_id = bucket.tenant_id.to_string();
    let storage_key = format!("{}@{}", ctx.key, version_id);
    let path = ctx.state.sandbox.object_path(&tenant_id, &ctx.bucket, &storage_key)?;

    let content_type = header_str(&ctx.headers, "content-type").unwrap_or("application/octet-stream").to_string();
    let custom = user_metadata(&ctx.headers);
    let legal_hold = header_str(&ctx.headers, "x-amz-object-lock-legal-hold") == Some("ON");
    let retention_mode = header_str(&ctx.headers, "x-amz-object-lock-mode").and_then(|m| match m {
        "GOVERNANCE" => Some(RetentionMode::Governance),
        "COMPLIANCE" => Some(RetentionMode::Compliance),
        _ => None,
    });
    let retain_until = header_str(&ctx.headers, "x-amz-object-lock-retain-until-date")
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let byte_delta = if versioning_enabled {
        size as i64
    } else {
        size as i64 - existing.as_ref().map_or(0, |o| o.size)
    };
    let object_delta = if existing.is_some() && !versioning_enabled { 0 } else { 1 };

    ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, byte_delta).await?;

    let metadata = ctx
        .state
        .storage
        .put(&path, false, ctx.body.as_ref(), Some(&content_type), custom.clone())
        .await;

    let metadata = match metadata {
        Ok(m) => m,
        Err(e) => {
            let _ = ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, -byte_delta).await;
            return Err(ferrostore_common::Error::from(e).into());
        }
    };

    let record = ObjectRecord {
        bucket_id: bucket.id,
        key: ctx.key.clone(),
        version_id: version_id.clone(),
        is_latest: true,
        is_delete_marker: false,
        size: metadata.size as i64,
        etag: metadata.etag.clone(),
        content_type: content_type.clone(),
        storage_class: header_str(&ctx.headers, "x-amz-storage-class").unwrap_or("STANDARD").to_string(),
        metadata_json: serde_json::to_string(&custom).unwrap_or_default(),
        tags_json: None,
        retention_mode,
        retain_until,
        legal_hold,
        last_modified: metadata.last_modified,
    };

    if !versioning_enabled {
        let _ = ctx.state.meta.delete_object_version(bucket.id, &ctx.key, UNVERSIONED_ID).await;
    }

    if let Err(e) = ctx.state.meta.put_object(bucket.id, &record).await {
        let _ = ctx.state.storage.delete(&path).await;
        let _ = ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, -byte_delta).await;
        return Err(e.into());
    }

    let _ = ctx.state.meta.adjust_bucket_counters(&ctx.bucket, object_delta, byte_delta).await;
    ctx.state
        .replication
        .enqueue_for_mutation(bucket.tenant_id, &ctx.bucket, &ctx.key, &version_id, ReplicationOp::Put)
        .await;

    let mut response = Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::ETAG, HeaderValue::from_str(&quoted(&metadata.etag)).unwrap_or(HeaderValue::from_static("")));
    if versioning_enabled {
        headers.insert("x-amz-version-id", HeaderValue::from_str(&version_id).unwrap_or(HeaderValue::from_static("")));
    }
    Ok(response)
}

async fn resolve_version(ctx: &RequestCtx, bucket: &ferrostore_meta::models::Bucket) -> ApiResult<ObjectRecord> {
    let record = if let Some(version_id) = ctx.query.get("versionId") {
        ctx.state.meta.get_object_version(bucket.id, &ctx.key, version_id).await?
    } else {
        ctx.state.meta.get_latest_object(bucket.id, &ctx.key).await?
    };
    record.ok_or_else(|| ferrostore_common::Error::ObjectNotFound { bucket: bucket.name.clone(), key: ctx.key.clone() }.into())
}

pub async fn get_object(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObject").await?;
    let record = resolve_version(&ctx, &bucket).await?;
    if record.is_delete_marker {
        return Err(ferrostore_common::Error::ObjectNotFound { bucket: bucket.name, key: ctx.key }.into());
    }

    if let Some(not_modified) = check_preconditions(&ctx.headers, &record.etag, record.last_modified)? {
        let mut response = Response::builder().status(not_modified).body(Body::empty()).unwrap_or_default();
        response.headers_mut().insert(axum::http::header::ETAG, HeaderValue::from_str(&quoted(&record.etag)).unwrap_or(HeaderValue::from_static("")));
        return Ok(response);
    }

    let tenant_id = bucket.tenant_id.to_string();
    let storage_key = format!("{}@{}", ctx.key, record.version_id);
    let path = ctx.state.sandbox.object_path(&tenant_id, &ctx.bucket, &storage_key)?;
    let (mut file, _) = ctx.state.storage.get(&path).await.map_err(ferrostore_common::Error::from)?;
    let total_size = record.size as u64;

    let range = header_str(&ctx.headers, "range").map(|h| parse_range_header(h, total_size));
    let range = match range {
        None => None,
        Some(Some(range)) => Some(range),
        Some(None) => {
            let mut response = ApiError::from(ferrostore_common::Error::InvalidRange).into_response();
            response
                .headers_mut()
                .insert(axum::http::header::CONTENT_RANGE, HeaderValue::from_str(&format!("bytes */{total_size}")).unwrap_or(HeaderValue::from_static("")));
            return Ok(response);
        }
    };

    let mut response = if let Some(range) = range {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};
        file.seek(std::io::SeekFrom::Start(range.start)).await.map_err(ferrostore_common::Error::from)?;
        let limited = file.take(range.end - range.start + 1);
        let stream = tokio_util::io::ReaderStream::new(limited);
        let mut response = Response::builder().status(StatusCode::PARTIAL_CONTENT).body(Body::from_stream(stream)).unwrap_or_default();
        let headers = response.headers_mut();
        headers.insert(axum::http::header::CONTENT_RANGE, HeaderValue::from_str(&format!("bytes {}-{}/{total_size}", range.start, range.end)).unwrap_or(HeaderValue::from_static("")));
        headers.insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from_str(&(range.end - range.start + 1).to_string()).unwrap_or(HeaderValue::from_static("0")));
        response
    } else {
        let stream = tokio_util::io::ReaderStream::new(file);
        let mut response = Response::builder().status(StatusCode::OK).body(Body::from_stream(stream)).unwrap_or_default();
        response.headers_mut().insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from_str(&record.size.to_string()).unwrap_or(HeaderValue::from_static("0")));
        response
    };

    let headers = response.headers_mut();
    headers.insert(axum::http::header::ETAG, HeaderValue::from_str(&quoted(&record.etag)).unwrap_or(HeaderValue::from_static("")));
    headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_str(&record.content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")));
    headers.insert(axum::http::header::LAST_MODIFIED, HeaderValue::from_str(&http_date(record.last_modified)).unwrap_or(HeaderValue::from_static("")));
    headers.insert(axum::http::header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert("x-amz-version-id", HeaderValue::from_str(&record.version_id).unwrap_or(HeaderValue::from_static("")));
    Ok(response)
}

pub async fn head_object(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObject").await?;
    let record = resolve_version(&ctx, &bucket).await?;
    if record.is_delete_marker {
        return Err(ferrostore_common::Error::ObjectNotFound { bucket: bucket.name, key: ctx.key }.into());
    }

    if let Some(not_modified) = check_preconditions(&ctx.headers, &record.etag, record.last_modified)? {
        let mut response = Response::builder().status(not_modified).body(Body::empty()).unwrap_or_default();
        response.headers_mut().insert(axum::http::header::ETAG, HeaderValue::from_str(&quoted(&record.etag)).unwrap_or(HeaderValue::from_static("")));
        return Ok(response);
    }

    let mut response = Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::ETAG, HeaderValue::from_str(&quoted(&record.etag)).unwrap_or(HeaderValue::from_static("")));
    headers.insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_str(&record.content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")));
    headers.insert(axum::http::header::CONTENT_LENGTH, HeaderValue::from_str(&record.size.to_string()).unwrap_or(HeaderValue::from_static("0")));
    headers.insert(axum::http::header::LAST_MODIFIED, HeaderValue::from_str(&http_date(record.last_modified)).unwrap_or(HeaderValue::from_static("")));
    headers.insert(axum::http::header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert("x-amz-version-id", HeaderValue::from_str(&record.version_id).unwrap_or(HeaderValue::from_static("")));
    Ok(response)
}

pub async fn delete_object(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:DeleteObject").await?;

    let lock_key = format!("{}/{}", ctx.bucket, ctx.key);
    let _guard = ctx.state.locks.lock(&lock_key).await;
    let bypass_governance = header_str(&ctx.headers, "x-amz-bypass-governance-retention") == Some("true");

    let mut response = Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap_or_default();

    if let Some(version_id) = ctx.query.get("versionId") {
        delete_specific_version(&ctx, &bucket, version_id, bypass_governance).await?;
        response.headers_mut().insert("x-amz-version-id", HeaderValue::from_str(version_id).unwrap_or(HeaderValue::from_static("")));
        return Ok(response);
    }

    match bucket.versioning {
        VersioningState::Enabled => {
            let marker = ObjectRecord {
                bucket_id: bucket.id,
                key: ctx.key.clone(),
                version_id: Uuid::new_v4().to_string(),
                is_latest: true,
                is_delete_marker: true,
                size: 0,
                etag: String::new(),
                content_type: String::new(),
                storage_class: "STANDARD".to_string(),
                metadata_json: "{}".to_string(),
                tags_json: None,
                retention_mode: None,
                retain_until: None,
                legal_hold: false,
                last_modified: Utc::now(),
            };
            ctx.state.meta.put_object(bucket.id, &marker).await?;
            response.headers_mut().insert("x-amz-delete-marker", HeaderValue::from_static("true"));
            response.headers_mut().insert("x-amz-version-id", HeaderValue::from_str(&marker.version_id).unwrap_or(HeaderValue::from_static("")));
        }
        _ => {
            if let Some(existing) = ctx.state.meta.get_latest_object(bucket.id, &ctx.key).await? {
                guard_against_retention(&existing, bypass_governance)?;
                delete_specific_version(&ctx, &bucket, &existing.version_id, bypass_governance).await?;
            }
        }
    }

    ctx.state
        .replication
        .enqueue_for_mutation(bucket.tenant_id, &ctx.bucket, &ctx.key, UNVERSIONED_ID, ReplicationOp::Delete)
        .await;
    Ok(response)
}

fn guard_against_retention(record: &ObjectRecord, bypass_governance: bool) -> ApiResult<()> {
    if record.legal_hold {
        return Err(ferrostore_common::Error::ObjectLocked("legal hold in effect".to_string()).into());
    }
    if let Some(retain_until) = record.retain_until
        && retain_until > Utc::now()
    {
        let governance_bypassable = record.retention_mode == Some(RetentionMode::Governance) && bypass_governance;
        if !governance_bypassable {
            return Err(ferrostore_common::Error::ObjectLocked("retention period has not expired".to_string()).into());
        }
    }
    Ok(())
}

async fn delete_specific_version(
    ctx: &RequestCtx,
    bucket: &ferrostore_meta::models::Bucket,
    version_id: &str,
    bypass_governance: bool,
) -> ApiResult<()> {
    if let Some(record) = ctx.state.meta.get_object_version(bucket.id, &ctx.key, version_id).await? {
        guard_against_retention(&record, bypass_governance)?;
        let tenant_id = bucket.tenant_id.to_string();
        let storage_key = format!("{}@{}", ctx.key, version_id);
        let path = ctx.state.sandbox.object_path(&tenant_id, &ctx.bucket, &storage_key)?;
        let _ = ctx.state.storage.delete(&path).await;
        ctx.state.meta.delete_object_version(bucket.id, &ctx.key, version_id).await?;
        let _ = ctx.state.meta.reserve_tenant_storage(bucket.tenant_id, -record.size).await;
        let _ = ctx.state.meta.adjust_bucket_counters(&bucket.name, -1, -record.size).await;
    }
    Ok(())
}

pub async fn delete_objects_batch(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:DeleteObject").await?;

    let request: xml::DeleteRequest = quick_xml::de::from_str(&String::from_utf8_lossy(&ctx.body))
        .map_err(|e| ferrostore_common::Error::invalid_request(e.to_string()))?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for object in request.object {
        let key_ctx = RequestCtx { key: object.key.clone(), ..ctx.clone() };
        let _guard = ctx.state.locks.lock(&format!("{}/{}", ctx.bucket, object.key)).await;
        let result = if let Some(version_id) = &object.version_id {
            delete_specific_version(&key_ctx, &bucket, version_id, false).await
        } else {
            match bucket.versioning {
                VersioningState::Enabled => {
                    let marker = ObjectRecord {
                        bucket_id: bucket.id,
                        key: object.key.clone(),
                        version_id: Uuid::new_v4().to_string(),
                        is_latest: true,
                        is_delete_marker: true,
                        size: 0,
                        etag: String::new(),
                        content_type: String::new(),
                        storage_class: "STANDARD".to_string(),
                        metadata_json: "{}".to_string(),
                        tags_json: None,
                        retention_mode: None,
                        retain_until: None,
                        legal_hold: false,
                        last_modified: Utc::now(),
                    };
                    ctx.state.meta.put_object(bucket.id, &marker).await.map_err(ApiError::from)
                }
                _ => {
                    if let Some(existing) = ctx.state.meta.get_latest_object(bucket.id, &object.key).await? {
                        delete_specific_version(&key_ctx, &bucket, &existing.version_id, false).await
                    } else {
                        Ok(())
                    }
                }
            }
        };
        match result {
            Ok(()) => {
                if !request.quiet {
                    deleted.push(xml::DeletedEntry { key: object.key, version_id: object.version_id, delete_marker: None });
                }
            }
            Err(e) => errors.push(xml::DeleteErrorEntry { key: object.key, code: e.source.s3_error_code().to_string(), message: e.source.to_string() }),
        }
    }

    let body = xml::DeleteResult { xmlns: "http://s3.amazonaws.com/doc/2006-03-01/", deleted, errors };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

pub async fn copy_object(ctx: RequestCtx) -> ApiResult<Response> {
    let dest_bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &dest_bucket, &ctx.key, None, "s3:PutObject").await?;

    let copy_source = header_str(&ctx.headers, "x-amz-copy-source")
        .ok_or_else(|| ferrostore_common::Error::invalid_request("missing x-amz-copy-source header"))?;
    let decoded = crate::routing::percent_decode_pub(copy_source.trim_start_matches('/'));
    let (src_bucket_name, src_key) = decoded
        .split_once('/')
        .ok_or_else(|| ferrostore_common::Error::invalid_request("invalid x-amz-copy-source"))?;

    let src_bucket = load_bucket(&ctx.state, src_bucket_name).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &src_bucket, src_key, None, "s3:GetObject").await?;

    let src_record = ctx
        .state
        .meta
        .get_latest_object(src_bucket.id, src_key)
        .await?
        .ok_or_else(|| ferrostore_common::Error::ObjectNotFound { bucket: src_bucket.name.clone(), key: src_key.to_string() })?;

    let src_tenant = src_bucket.tenant_id.to_string();
    let src_path = ctx.state.sandbox.object_path(&src_tenant, &src_bucket.name, &format!("{src_key}@{}", src_record.version_id))?;
    let (mut file, _) = ctx.state.storage.get(&src_path).await.map_err(ferrostore_common::Error::from)?;

    let lock_key = format!("{}/{}", ctx.bucket, ctx.key);
    let _guard = ctx.state.locks.lock(&lock_key).await;

    let versioning_enabled = dest_bucket.versioning == VersioningState::Enabled;
    let version_id = if versioning_enabled { Uuid::new_v4().to_string() } else { UNVERSIONED_ID.to_string() };
    let dest_tenant = dest_bucket.tenant_id.to_string();
    let dest_path = ctx.state.sandbox.object_path(&dest_tenant, &ctx.bucket, &format!("{}@{}", ctx.key, version_id))?;

    ctx.state.meta.reserve_tenant_storage(dest_bucket.tenant_id, src_record.size).await?;
    let metadata = ctx
        .state
        .storage
        .put(&dest_path, false, &mut file, Some(&src_record.content_type), HashMap::new())
        .await
        .map_err(ferrostore_common::Error::from)?;

    if !versioning_enabled {
        let _ = ctx.state.meta.delete_object_version(dest_bucket.id, &ctx.key, UNVERSIONED_ID).await;
    }

    let record = ObjectRecord {
        bucket_id: dest_bucket.id,
        key: ctx.key.clone(),
        version_id: version_id.clone(),
        is_latest: true,
        is_delete_marker: false,
        size: metadata.size as i64,
        etag: metadata.etag.clone(),
        content_type: src_record.content_type.clone(),
        storage_class: src_record.storage_class.clone(),
        metadata_json: src_record.metadata_json.clone(),
        tags_json: None,
        retention_mode: None,
        retain_until: None,
        legal_hold: false,
        last_modified: metadata.last_modified,
    };
    ctx.state.meta.put_object(dest_bucket.id, &record).await?;
    let _ = ctx.state.meta.adjust_bucket_counters(&ctx.bucket, 1, metadata.size as i64).await;
    ctx.state
        .replication
        .enqueue_for_mutation(dest_bucket.tenant_id, &ctx.bucket, &ctx.key, &version_id, ReplicationOp::Put)
        .await;

    let body = xml::CopyObjectResult { last_modified: metadata.last_modified, etag: quoted(&metadata.etag) };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

pub async fn get_tagging(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObjectTagging").await?;
    let record = resolve_version(&ctx, &bucket).await?;
    let tags: Vec<xml::Tag> = record.tags_json.as_deref().and_then(|j| serde_json::from_str(j).ok()).unwrap_or_default();
    let body = xml::TaggingDocument::new(tags);
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(xml_body))
        .unwrap_or_default())
}

pub async fn put_tagging(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObjectTagging").await?;
    let record = resolve_version(&ctx, &bucket).await?;

    #[derive(serde::Deserialize)]
    #[serde(rename = "Tagging")]
    struct TaggingRequest {
        #[serde(rename = "TagSet")]
        tag_set: xml::TagSet,
    }
    let doc: TaggingRequest = quick_xml::de::from_str(&String::from_utf8_lossy(&ctx.body))
        .map_err(|e| ferrostore_common::Error::invalid_request(e.to_string()))?;
    let tags_json = serde_json::to_string(&doc.tag_set.tag).unwrap_or_default();
    ctx.state.meta.set_object_tags_json(bucket.id, &ctx.key, &record.version_id, Some(&tags_json)).await?;
    Ok(Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default())
}

pub async fn get_acl(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObjectAcl").await?;
    resolve_version(&ctx, &bucket).await?;
    // Object-level ACL is not persisted separately; bucket ACL governs.
    let body = bucket.acl_json.unwrap_or_else(|| "[]".to_string());
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default())
}

pub async fn put_acl(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObjectAcl").await?;
    resolve_version(&ctx, &bucket).await?;
    Err(ferrostore_common::Error::not_implemented("object-level ACLs are not stored independently of the bucket ACL").into())
}

pub async fn get_retention(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObjectRetention").await?;
    let record = resolve_version(&ctx, &bucket).await?;
    let mode = match record.retention_mode {
        Some(RetentionMode::Governance) => "GOVERNANCE",
        Some(RetentionMode::Compliance) => "COMPLIANCE",
        None => return Err(ferrostore_common::Error::invalid_request("object has no retention configuration").into()),
    };
    let body = serde_json::json!({ "Mode": mode, "RetainUntilDate": record.retain_until });
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_default())
}

pub async fn put_retention(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObjectRetention").await?;
    let record = resolve_version(&ctx, &bucket).await?;

    #[derive(serde::Deserialize)]
    struct RetentionBody {
        mode: String,
        retain_until_date: chrono::DateTime<Utc>,
    }
    let parsed: RetentionBody =
        serde_json::from_slice(&ctx.body).map_err(|e| ferrostore_common::Error::invalid_request(e.to_string()))?;
    let mode = match parsed.mode.as_str() {
        "GOVERNANCE" => RetentionMode::Governance,
        "COMPLIANCE" => RetentionMode::Compliance,
        other => return Err(ferrostore_common::Error::invalid_request(format!("unknown retention mode: {other}")).into()),
    };
    ctx.state
        .meta
        .set_object_retention(bucket.id, &ctx.key, &record.version_id, mode, parsed.retain_until_date)
        .await?;
    Ok(Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default())
}

pub async fn get_legal_hold(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:GetObjectLegalHold").await?;
    let record = resolve_version(&ctx, &bucket).await?;
    let body = serde_json::json!({ "Status": if record.legal_hold { "ON" } else { "OFF" } });
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_default())
}

pub async fn put_legal_hold(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_object(&ctx.auth, &bucket, &ctx.key, None, "s3:PutObjectLegalHold").await?;
    let record = resolve_version(&ctx, &bucket).await?;

    #[derive(serde::Deserialize)]
    struct LegalHoldBody {
        status: String,
    }
    let parsed: LegalHoldBody =
        serde_json::from_slice(&ctx.body).map_err(|e| ferrostore_common::Error::invalid_request(e.to_string()))?;
    ctx.state
        .meta
        .set_object_legal_hold(bucket.id, &ctx.key, &record.version_id, parsed.status == "ON")
        .await?;
    Ok(Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_and_unquoted_roundtrip() {
        assert_eq!(quoted("abc123"), "\"abc123\"");
        assert_eq!(unquoted("\"abc123\""), "abc123");
    }

    #[test]
    fn test_user_metadata_extracts_amz_meta_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-owner", HeaderValue::from_static("alice"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let custom = user_metadata(&headers);
        assert_eq!(custom.get("owner"), Some(&"alice".to_string()));
        assert_eq!(custom.len(), 1);
    }

    #[test]
    fn test_parse_range_header_variants() {
        let r = parse_range_header("bytes=0-99", 1000).unwrap();
        assert_eq!((r.start, r.end), (0, 99));

        let r = parse_range_header("bytes=900-", 1000).unwrap();
        assert_eq!((r.start, r.end), (900, 999));

        let r = parse_range_header("bytes=-500", 1000).unwrap();
        assert_eq!((r.start, r.end), (500, 999));

        let r = parse_range_header("bytes=0-9999", 1000).unwrap();
        assert_eq!((r.start, r.end), (0, 999));

        assert!(parse_range_header("bytes=1000-1005", 1000).is_none());
        assert!(parse_range_header("bytes=500-100", 1000).is_none());
        assert!(parse_range_header("not-a-range", 1000).is_none());
    }

    #[test]
    fn test_etag_matches_handles_wildcard_and_list() {
        assert!(etag_matches("*", "abc"));
        assert!(etag_matches("\"abc\", \"def\"", "def"));
        assert!(!etag_matches("\"abc\"", "def"));
    }

    #[test]
    fn test_check_preconditions_if_match_failure_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("if-match", HeaderValue::from_static("\"other\""));
        let err = check_preconditions(&headers, "current", Utc::now()).unwrap_err();
        assert_eq!(err.source.s3_error_code(), "PreconditionFailed");
    }

    #[test]
    fn test_check_preconditions_if_none_match_yields_not_modified() {
        let mut headers = HeaderMap::new();
        headers.insert("if-none-match", HeaderValue::from_static("\"current\""));
        let status = check_preconditions(&headers, "current", Utc::now()).unwrap();
        assert_eq!(status, Some(StatusCode::NOT_MODIFIED));
    }

    #[test]
    fn test_check_preconditions_no_headers_passes() {
        let headers = HeaderMap::new();
        assert_eq!(check_preconditions(&headers, "current", Utc::now()).unwrap(), None);
    }
}
