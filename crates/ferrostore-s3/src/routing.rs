//! Routing (§4.7 REDESIGN FLAG): an explicit, ordered precedence table per
//! path shape instead of axum's insertion-order path routing. Each shape
//! (`/`, `/{bucket}`, `/{bucket}/{key...}`) owns a `Vec<Route>` evaluated
//! top to bottom; the first entry whose method/query/header predicates all
//! match wins. A query-parameter sub-resource (`?policy`, `?versioning`, ...)
//! is always tried before the generic bucket/object operation, and a header
//! predicate (`x-amz-copy-source`) can steer a `PUT` to CopyObject instead
//! of PutObject.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use ferrostore_auth::AuthResult;

use crate::error::{ApiError, ApiResult};
use crate::handlers::{bucket, multipart, object};
use crate::state::S3State;

pub type BoxFut = Pin<Box<dyn Future<Output = ApiResult<Response>> + Send>>;

/// Everything a handler needs, already authenticated.
#[derive(Clone)]
pub struct RequestCtx {
    pub state: Arc<S3State>,
    pub auth: AuthResult,
    pub method: Method,
    pub bucket: String,
    pub key: String,
    pub query: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestCtx {
    pub fn has_query(&self, name: &str) -> bool {
        self.query.contains_key(name)
    }
}

pub struct Route {
    pub method: Method,
    /// Query string key that must be present for this route to match.
    pub query_param: Option<&'static str>,
    /// Header that must be present for this route to match (e.g. a copy source).
    pub header_present: Option<&'static str>,
    pub handler: fn(RequestCtx) -> BoxFut,
}

fn matches(route: &Route, method: &Method, query: &BTreeMap<String, String>, headers: &HeaderMap) -> bool {
    if &route.method != method {
        return false;
    }
    if let Some(param) = route.query_param
        && !query.contains_key(param)
    {
        return false;
    }
    if let Some(header) = route.header_present
        && !headers.contains_key(header)
    {
        return false;
    }
    true
}

async fn dispatch(routes: &[Route], ctx: RequestCtx) -> ApiResult<Response> {
    let method = ctx.method.clone();
    for route in routes {
        if matches(route, &method, &ctx.query, &ctx.headers) {
            return (route.handler)(ctx).await;
        }
    }
    Err(ApiError::new(
        ferrostore_common::Error::MethodNotAllowed,
        format!("{}/{}", ctx.bucket, ctx.key),
    ))
}

fn root_routes() -> Vec<Route> {
    vec![Route { method: Method::GET, query_param: None, header_present: None, handler: |c| Box::pin(bucket::list_buckets(c)) }]
}

fn bucket_routes() -> Vec<Route> {
    vec![
        Route { method: Method::PUT, query_param: Some("versioning"), header_present: None, handler: |c| Box::pin(bucket::put_versioning(c)) },
        Route { method: Method::GET, query_param: Some("versioning"), header_present: None, handler: |c| Box::pin(bucket::get_versioning(c)) },
        Route { method: Method::PUT, query_param: Some("policy"), header_present: None, handler: |c| Box::pin(bucket::put_policy(c)) },
        Route { method: Method::GET, query_param: Some("policy"), header_present: None, handler: |c| Box::pin(bucket::get_policy(c)) },
        Route { method: Method::DELETE, query_param: Some("policy"), header_present: None, handler: |c| Box::pin(bucket::delete_policy(c)) },
        Route { method: Method::PUT, query_param: Some("cors"), header_present: None, handler: |c| Box::pin(bucket::put_cors(c)) },
        Route { method: Method::GET, query_param: Some("cors"), header_present: None, handler: |c| Box::pin(bucket::get_cors(c)) },
        Route { method: Method::DELETE, query_param: Some("cors"), header_present: None, handler: |c| Box::pin(bucket::delete_cors(c)) },
        Route { method: Method::PUT, query_param: Some("lifecycle"), header_present: None, handler: |c| Box::pin(bucket::put_lifecycle(c)) },
        Route { method: Method::GET, query_param: Some("lifecycle"), header_present: None, handler: |c| Box::pin(bucket::get_lifecycle(c)) },
        Route { method: Method::DELETE, query_param: Some("lifecycle"), header_present: None, handler: |c| Box::pin(bucket::delete_lifecycle(c)) },
        Route { method: Method::PUT, query_param: Some("tagging"), header_present: None, handler: |c| Box::pin(bucket::put_tagging(c)) },
        Route { method: Method::GET, query_param: Some("tagging"), header_present: None, handler: |c| Box::pin(bucket::get_tagging(c)) },
        Route { method: Method::DELETE, query_param: Some("tagging"), header_present: None, handler: |c| Box::pin(bucket::delete_tagging(c)) },
        Route { method: Method::PUT, query_param: Some("acl"), header_present: None, handler: |c| Box::pin(bucket::put_acl(c)) },
        Route { method: Method::GET, query_param: Some("acl"), header_present: None, handler: |c| Box::pin(bucket::get_acl(c)) },
        Route { method: Method::PUT, query_param: Some("object-lock"), header_present: None, handler: |c| Box::pin(bucket::put_object_lock_config(c)) },
        Route { method: Method::GET, query_param: Some("object-lock"), header_present: None, handler: |c| Box::pin(bucket::get_object_lock_config(c)) },
        Route { method: Method::GET, query_param: Some("location"), header_present: None, handler: |c| Box::pin(bucket::get_location(c)) },
        Route { method: Method::GET, query_param: Some("versions"), header_present: None, handler: |c| Box::pin(bucket::list_object_versions(c)) },
        Route { method: Method::HEAD, query_param: None, header_present: None, handler: |c| Box::pin(bucket::head_bucket(c)) },
        Route { method: Method::POST, query_param: Some("delete"), header_present: None, handler: |c| Box::pin(object::delete_objects_batch(c)) },
        Route { method: Method::GET, query_param: Some("list-type"), header_present: None, handler: |c| Box::pin(bucket::list_objects_v2(c)) },
        Route { method: Method::GET, query_param: None, header_present: None, handler: |c| Box::pin(bucket::list_objects_v1(c)) },
        Route { method: Method::PUT, query_param: None, header_present: None, handler: |c| Box::pin(bucket::create_bucket(c)) },
        Route { method: Method::DELETE, query_param: None, header_present: None, handler: |c| Box::pin(bucket::delete_bucket(c)) },
    ]
}

fn object_routes() -> Vec<Route> {
    vec![
        Route { method: Method::PUT, query_param: None, header_present: Some("x-amz-copy-source"), handler: |c| Box::pin(object::copy_object(c)) },
        Route { method: Method::PUT, query_param: Some("tagging"), header_present: None, handler: |c| Box::pin(object::put_tagging(c)) },
        Route { method: Method::GET, query_param: Some("tagging"), header_present: None, handler: |c| Box::pin(object::get_tagging(c)) },
        Route { method: Method::PUT, query_param: Some("acl"), header_present: None, handler: |c| Box::pin(object::put_acl(c)) },
        Route { method: Method::GET, query_param: Some("acl"), header_present: None, handler: |c| Box::pin(object::get_acl(c)) },
        Route { method: Method::PUT, query_param: Some("retention"), header_present: None, handler: |c| Box::pin(object::put_retention(c)) },
        Route { method: Method::GET, query_param: Some("retention"), header_present: None, handler: |c| Box::pin(object::get_retention(c)) },
        Route { method: Method::PUT, query_param: Some("legal-hold"), header_present: None, handler: |c| Box::pin(object::put_legal_hold(c)) },
        Route { method: Method::GET, query_param: Some("legal-hold"), header_present: None, handler: |c| Box::pin(object::get_legal_hold(c)) },
        Route { method: Method::POST, query_param: Some("uploads"), header_present: None, handler: |c| Box::pin(multipart::initiate(c)) },
        Route { method: Method::PUT, query_param: Some("partNumber"), header_present: None, handler: |c| Box::pin(multipart::upload_part(c)) },
        Route { method: Method::POST, query_param: Some("uploadId"), header_present: None, handler: |c| Box::pin(multipart::complete(c)) },
        Route { method: Method::DELETE, query_param: Some("uploadId"), header_present: None, handler: |c| Box::pin(multipart::abort(c)) },
        Route { method: Method::GET, query_param: Some("uploadId"), header_present: None, handler: |c| Box::pin(multipart::list_parts(c)) },
        Route { method: Method::PUT, query_param: None, header_present: None, handler: |c| Box::pin(object::put_object(c)) },
        Route { method: Method::GET, query_param: None, header_present: None, handler: |c| Box::pin(object::get_object(c)) },
        Route { method: Method::HEAD, query_param: None, header_present: None, handler: |c| Box::pin(object::head_object(c)) },
        Route { method: Method::DELETE, query_param: None, header_present: None, handler: |c| Box::pin(object::delete_object(c)) },
    ]
}

fn parse_query(raw: Option<String>) -> BTreeMap<String, String> {
    let Some(raw) = raw else { return BTreeMap::new() };
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            (urlencoding_decode(key), urlencoding_decode(value))
        })
        .collect()
}

fn urlencoding_decode(s: &str) -> String {
    percent_decode(s.as_bytes())
}

/// Percent-decode a `x-amz-copy-source`-style path component.
pub(crate) fn percent_decode_pub(s: &str) -> String {
    percent_decode(s.as_bytes())
}

fn percent_decode(bytes: &[u8]) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
                    && let Ok(byte) = u8::from_str_radix(hex, 16)
                {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

async fn root_entry(
    State(state): State<Arc<S3State>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Response {
    let query = parse_query(raw_query);
    handle(&state, method, headers, query, String::new(), String::new(), body, root_routes()).await
}

async fn bucket_entry(
    State(state): State<Arc<S3State>>,
    Path(bucket): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Response {
    let query = parse_query(raw_query);
    handle(&state, method, headers, query, bucket, String::new(), body, bucket_routes()).await
}

async fn object_entry(
    State(state): State<Arc<S3State>>,
    Path((bucket, key)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Response {
    let query = parse_query(raw_query);
    handle(&state, method, headers, query, bucket, key, body, object_routes()).await
}

#[allow(clippy::too_many_arguments)]
async fn handle(
    state: &Arc<S3State>,
    method: Method,
    headers: HeaderMap,
    query: BTreeMap<String, String>,
    bucket: String,
    key: String,
    body: Bytes,
    routes: Vec<Route>,
) -> Response {
    let resource = format!("{bucket}/{key}");
    let mut fake_request = http::Request::builder()
        .method(method.clone())
        .uri(format!("/{bucket}/{key}"))
        .body(())
        .unwrap_or_else(|_| http::Request::new(()));
    *fake_request.headers_mut() = headers.clone();

    let auth = match state.auth.authenticate(&fake_request).await {
        Ok(auth) => auth,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let ctx = RequestCtx { state: Arc::clone(state), auth, method, bucket, key, query, headers, body };
    match dispatch(&routes, ctx).await {
        Ok(response) => response,
        Err(e) => {
            let mut err = e;
            if err.resource.is_empty() {
                err.resource = resource;
            }
            err.into_response()
        }
    }
}

pub fn build_router(state: Arc<S3State>) -> Router {
    Router::new()
        .route("/", any(root_entry))
        .route("/{bucket}", any(bucket_entry))
        .route("/{bucket}/{*key}", any(object_entry))
        .with_state(state)
}
