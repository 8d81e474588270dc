//! Maps [`ferrostore_common::Error`] onto S3 XML error responses (§7).
//!
//! The taxonomy itself lives in `ferrostore-common`; this module only knows
//! how to render it as `<Error>...</Error>` with the right status code.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A request-scoped wrapper around the common error taxonomy, carrying the
/// resource path and request id needed to render the S3 error schema.
#[derive(Debug)]
pub struct ApiError {
    pub source: ferrostore_common::Error,
    pub resource: String,
    pub request_id: Uuid,
}

impl ApiError {
    #[must_use]
    pub fn new(source: impl Into<ferrostore_common::Error>, resource: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            resource: resource.into(),
            request_id: Uuid::new_v4(),
        }
    }
}

impl From<ferrostore_common::Error> for ApiError {
    fn from(source: ferrostore_common::Error) -> Self {
        Self::new(source, String::new())
    }
}

impl From<ferrostore_auth::AuthError> for ApiError {
    fn from(source: ferrostore_auth::AuthError) -> Self {
        Self::new(ferrostore_common::Error::from(source), String::new())
    }
}

impl From<ferrostore_meta::MetaError> for ApiError {
    fn from(source: ferrostore_meta::MetaError) -> Self {
        Self::new(ferrostore_common::Error::from(source), String::new())
    }
}

impl From<ferrostore_storage::StorageError> for ApiError {
    fn from(source: ferrostore_storage::StorageError) -> Self {
        Self::new(ferrostore_common::Error::from(source), String::new())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
#[serde(rename = "Error")]
struct ErrorBody {
    code: String,
    message: String,
    resource: String,
    request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.source.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            code: self.source.s3_error_code().to_string(),
            message: self.source.to_string(),
            resource: self.resource,
            request_id: self.request_id.to_string(),
        };
        let xml = crate::xml::to_xml_document(&body).unwrap_or_else(|_| {
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>InternalError</Code><RequestId>{}</RequestId></Error>",
                body.request_id
            )
        });

        let mut response = Response::builder().status(status).body(Body::from(xml)).unwrap_or_default();
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        response
            .headers_mut()
            .insert("x-amz-request-id", HeaderValue::from_str(&self.request_id.to_string()).unwrap_or(HeaderValue::from_static("-")));
        response
    }
}
