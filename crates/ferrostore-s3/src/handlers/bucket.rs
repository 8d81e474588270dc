//! Bucket operations (§4.6): lifecycle, sub-resources, and object listing.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ferrostore_common::types::BucketName;
use ferrostore_meta::models::VersioningState;

use crate::error::ApiResult;
use crate::handlers::load_bucket;
use crate::routing::RequestCtx;
use crate::xml;

fn xml_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/xml")
        .body(Body::from(body))
        .unwrap_or_default()
}

fn empty_ok() -> Response {
    Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap_or_default()
}

fn not_found_sub_resource<T>() -> ApiResult<T> {
    Err(ferrostore_common::Error::invalid_request("no sub-resource configuration set").into())
}

pub async fn list_buckets(ctx: RequestCtx) -> ApiResult<Response> {
    let buckets = ctx.state.meta.list_buckets(ctx.auth.tenant_id).await?;
    let entries = buckets
        .into_iter()
        .map(|b| xml::BucketEntry { name: b.name, creation_date: b.created_at })
        .collect();
    let owner = xml::Owner { id: ctx.auth.user_id.to_string(), display_name: ctx.auth.user_arn().to_string() };
    let body = xml::ListAllMyBucketsResult::new(owner, entries);
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

pub async fn create_bucket(ctx: RequestCtx) -> ApiResult<Response> {
    BucketName::parse(ctx.bucket.clone()).map_err(ferrostore_common::Error::from)?;

    if let Some(existing) = ctx.state.meta.get_bucket(&ctx.bucket).await? {
        return Err(if existing.owner_user_id == ctx.auth.user_id {
            ferrostore_common::Error::BucketAlreadyOwnedByYou(ctx.bucket).into()
        } else {
            ferrostore_common::Error::BucketAlreadyExists(ctx.bucket).into()
        });
    }

    ctx.state.meta.create_bucket(ctx.auth.tenant_id, &ctx.bucket, ctx.auth.user_id).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Location", format!("/{}", ctx.bucket))
        .body(Body::empty())
        .unwrap_or_default())
}

pub async fn delete_bucket(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:DeleteBucket").await?;
    ctx.state.meta.delete_bucket(ctx.auth.tenant_id, &ctx.bucket).await?;
    Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap_or_default())
}

pub async fn head_bucket(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:ListBucket").await?;
    Ok(empty_ok())
}

pub async fn get_location(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:GetBucketLocation").await?;
    let body = xml::LocationConstraint { xmlns: "http://s3.amazonaws.com/doc/2006-03-01/", region: ctx.state.s3_config.region.clone() };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

pub async fn get_versioning(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:GetBucketVersioning").await?;
    let status = match bucket.versioning {
        VersioningState::Unversioned => None,
        VersioningState::Enabled => Some("Enabled".to_string()),
        VersioningState::Suspended => Some("Suspended".to_string()),
    };
    let body = xml::VersioningConfiguration { xmlns: "http://s3.amazonaws.com/doc/2006-03-01/", status };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

pub async fn put_versioning(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:PutBucketVersioning").await?;

    let text = String::from_utf8_lossy(&ctx.body);
    let state = if text.contains("Suspended") {
        VersioningState::Suspended
    } else if text.contains("Enabled") {
        VersioningState::Enabled
    } else {
        return Err(ferrostore_common::Error::invalid_request("unrecognized versioning status").into());
    };
    ctx.state.meta.set_bucket_versioning(&ctx.bucket, state).await?;
    Ok(empty_ok())
}

macro_rules! sub_resource_json {
    ($get_name:ident, $put_name:ident, $delete_name:ident, $field:ident, $setter:ident, $action:literal) => {
        pub async fn $get_name(ctx: RequestCtx) -> ApiResult<Response> {
            let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
            ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, $action).await?;
            match bucket.$field {
                Some(body) => Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(axum::http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap_or_default()),
                None => not_found_sub_resource(),
            }
        }

        pub async fn $put_name(ctx: RequestCtx) -> ApiResult<Response> {
            let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
            ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, $action).await?;
            let body = String::from_utf8_lossy(&ctx.body).into_owned();
            ctx.state.meta.$setter(&ctx.bucket, Some(&body)).await?;
            Ok(empty_ok())
        }

        pub async fn $delete_name(ctx: RequestCtx) -> ApiResult<Response> {
            let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
            ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, $action).await?;
            ctx.state.meta.$setter(&ctx.bucket, None).await?;
            Ok(Response::builder().status(StatusCode::NO_CONTENT).body(Body::empty()).unwrap_or_default())
        }
    };
}

sub_resource_json!(get_policy, put_policy, delete_policy, policy_json, set_bucket_policy_json, "s3:GetBucketPolicy");
sub_resource_json!(get_cors, put_cors, delete_cors, cors_json, set_bucket_cors_json, "s3:GetBucketCORS");
sub_resource_json!(get_lifecycle, put_lifecycle, delete_lifecycle, lifecycle_json, set_bucket_lifecycle_json, "s3:GetLifecycleConfiguration");
sub_resource_json!(get_tagging, put_tagging, delete_tagging, tags_json, set_bucket_tags_json, "s3:GetBucketTagging");

pub async fn get_acl(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:GetBucketAcl").await?;
    let body = bucket.acl_json.unwrap_or_else(|| "[]".to_string());
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default())
}

pub async fn put_acl(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:PutBucketAcl").await?;
    let body = String::from_utf8_lossy(&ctx.body).into_owned();
    ctx.state.meta.set_bucket_acl_json(&ctx.bucket, Some(&body)).await?;
    Ok(empty_ok())
}

pub async fn get_object_lock_config(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:GetBucketObjectLockConfiguration").await?;
    match bucket.object_lock_json {
        Some(body) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_default()),
        None => not_found_sub_resource(),
    }
}

pub async fn put_object_lock_config(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:PutBucketObjectLockConfiguration").await?;
    let body = String::from_utf8_lossy(&ctx.body).into_owned();
    ctx.state.meta.set_bucket_object_lock_json(&ctx.bucket, Some(&body)).await?;
    Ok(empty_ok())
}

fn marker_or_empty(ctx: &RequestCtx, keys: &[&str]) -> String {
    keys.iter().find_map(|k| ctx.query.get(*k)).cloned().unwrap_or_default()
}

pub async fn list_objects_v1(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:ListBucket").await?;

    let prefix = ctx.query.get("prefix").cloned().unwrap_or_default();
    let marker = marker_or_empty(&ctx, &["marker"]);
    let max_keys: i64 = ctx.query.get("max-keys").and_then(|v| v.parse().ok()).unwrap_or(1000);

    let mut records = ctx.state.meta.list_objects(bucket.id, &prefix, max_keys + 1, &marker).await?;
    let is_truncated = records.len() as i64 > max_keys;
    if is_truncated {
        records.truncate(max_keys as usize);
    }
    let next_marker = is_truncated.then(|| records.last().map(|r| r.key.clone())).flatten();

    let contents = records
        .into_iter()
        .map(|r| xml::Contents { key: r.key, last_modified: r.last_modified, etag: format!("\"{}\"", r.etag), size: r.size, storage_class: r.storage_class, owner: None })
        .collect();

    let body = xml::ListBucketResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        name: bucket.name,
        prefix,
        marker: Some(marker),
        next_marker,
        max_keys,
        is_truncated,
        contents,
        ..Default::default()
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

pub async fn list_objects_v2(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:ListBucket").await?;

    let prefix = ctx.query.get("prefix").cloned().unwrap_or_default();
    let marker = marker_or_empty(&ctx, &["continuation-token", "start-after"]);
    let max_keys: i64 = ctx.query.get("max-keys").and_then(|v| v.parse().ok()).unwrap_or(1000);

    let mut records = ctx.state.meta.list_objects(bucket.id, &prefix, max_keys + 1, &marker).await?;
    let is_truncated = records.len() as i64 > max_keys;
    if is_truncated {
        records.truncate(max_keys as usize);
    }
    let next_token = is_truncated.then(|| records.last().map(|r| r.key.clone())).flatten();
    let key_count = records.len() as i64;

    let contents = records
        .into_iter()
        .map(|r| xml::Contents { key: r.key, last_modified: r.last_modified, etag: format!("\"{}\"", r.etag), size: r.size, storage_class: r.storage_class, owner: None })
        .collect();

    let body = xml::ListBucketResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        name: bucket.name,
        prefix,
        continuation_token: ctx.query.get("continuation-token").cloned(),
        next_continuation_token: next_token,
        key_count: Some(key_count),
        max_keys,
        is_truncated,
        contents,
        ..Default::default()
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

pub async fn list_object_versions(ctx: RequestCtx) -> ApiResult<Response> {
    let bucket = load_bucket(&ctx.state, &ctx.bucket).await?;
    ctx.state.auth.authorize_bucket(&ctx.auth, &bucket, "s3:ListBucketVersions").await?;

    let prefix = ctx.query.get("prefix").cloned().unwrap_or_default();
    let marker = ctx.query.get("key-marker").cloned().unwrap_or_default();
    let max_keys: i64 = ctx.query.get("max-keys").and_then(|v| v.parse().ok()).unwrap_or(1000);

    // `list_objects` only returns is_latest rows; version history enumeration
    // beyond the latest version per key is left to a future MetaStore query.
    let records = ctx.state.meta.list_objects(bucket.id, &prefix, max_keys, &marker).await?;
    let mut versions = Vec::new();
    let mut delete_markers = Vec::new();
    for record in records {
        if record.is_delete_marker {
            delete_markers.push(xml::DeleteMarkerEntry {
                key: record.key,
                version_id: record.version_id,
                is_latest: record.is_latest,
                last_modified: record.last_modified,
            });
        } else {
            versions.push(xml::VersionEntry {
                key: record.key,
                version_id: record.version_id,
                is_latest: record.is_latest,
                last_modified: record.last_modified,
                etag: format!("\"{}\"", record.etag),
                size: record.size,
                storage_class: record.storage_class,
            });
        }
    }

    let body = xml::ListVersionsResult {
        xmlns: "http://s3.amazonaws.com/doc/2006-03-01/",
        name: bucket.name,
        prefix,
        key_marker: Some(marker),
        max_keys,
        is_truncated: false,
        versions,
        delete_markers,
    };
    let xml_body = xml::to_xml_document(&body).map_err(ferrostore_common::Error::internal)?;
    Ok(xml_response(xml_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_or_empty_prefers_first_present_key() {
        let mut query = std::collections::BTreeMap::new();
        query.insert("start-after".to_string(), "a".to_string());
        let ctx_query = query;
        assert_eq!(ctx_query.get("continuation-token").or(ctx_query.get("start-after")).cloned().unwrap_or_default(), "a");
    }
}
