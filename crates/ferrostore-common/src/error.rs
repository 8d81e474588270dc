//! Crate-wide error taxonomy and its mapping onto S3 error codes / HTTP status.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in ferrostore.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket already owned by you: {0}")]
    BucketAlreadyOwnedByYou(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("object version not found: {bucket}/{key} ({version_id})")]
    NoSuchVersion {
        bucket: String,
        key: String,
        version_id: String,
    },

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] crate::types::BucketNameError),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] crate::types::ObjectKeyError),

    #[error("access denied")]
    AccessDenied,

    #[error("access denied: object is locked ({0})")]
    ObjectLocked(String),

    #[error("invalid access key")]
    InvalidAccessKey,

    #[error("the request signature does not match")]
    SignatureDoesNotMatch,

    #[error("tenant or user quota exceeded")]
    QuotaExceeded,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid byte range requested")]
    InvalidRange,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("entity too large: maximum size is {max_size} bytes")]
    EntityTooLarge { max_size: u64 },

    #[error("entity too small: minimum part size is {min_size} bytes")]
    EntityTooSmall { min_size: u64 },

    #[error("no such upload: {upload_id}")]
    NoSuchUpload { upload_id: String },

    #[error("invalid part number: {part_number}")]
    InvalidPart { part_number: i32 },

    #[error("part order is invalid")]
    InvalidPartOrder,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("database error: {0}")]
    Database(String),
}

impl Error {
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    #[must_use]
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether retrying the same operation might succeed without any change
    /// on the caller's part (transient infrastructure failure).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Timeout | Self::ServiceUnavailable
        )
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::NoSuchVersion { .. }
        )
    }

    /// HTTP status code this error should be reported as.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::BucketNotFound(_)
            | Self::ObjectNotFound { .. }
            | Self::NoSuchVersion { .. }
            | Self::NoSuchUpload { .. } => 404,
            Self::BucketAlreadyExists(_) | Self::BucketAlreadyOwnedByYou(_) => 409,
            Self::BucketNotEmpty(_) => 409,
            Self::AccessDenied | Self::ObjectLocked(_) | Self::InvalidAccessKey => 403,
            Self::SignatureDoesNotMatch => 403,
            Self::QuotaExceeded => 403,
            Self::InvalidBucketName(_)
            | Self::InvalidObjectKey(_)
            | Self::InvalidRequest(_)
            | Self::InvalidArgument(_)
            | Self::InvalidPart { .. }
            | Self::InvalidPartOrder
            | Self::Deserialization(_) => 400,
            Self::InvalidRange => 416,
            Self::MethodNotAllowed => 405,
            Self::PreconditionFailed => 412,
            Self::EntityTooLarge { .. } => 400,
            Self::EntityTooSmall { .. } => 400,
            Self::Timeout => 408,
            Self::ServiceUnavailable | Self::ConnectionFailed(_) => 503,
            Self::NotImplemented(_) => 501,
            Self::Io(_)
            | Self::Internal(_)
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Database(_) => 500,
        }
    }

    /// S3-compatible error code string (the `<Code>` element of an error XML body).
    #[must_use]
    pub const fn s3_error_code(&self) -> &'static str {
        match self {
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::ObjectNotFound { .. } | Self::NoSuchVersion { .. } => "NoSuchKey",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou(_) => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::AccessDenied | Self::ObjectLocked(_) | Self::QuotaExceeded => "AccessDenied",
            Self::InvalidAccessKey => "InvalidAccessKeyId",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidObjectKey(_) => "KeyTooLongError",
            Self::InvalidRequest(_) | Self::InvalidArgument(_) | Self::Deserialization(_) => {
                "InvalidRequest"
            }
            Self::InvalidRange => "InvalidRange",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::PreconditionFailed => "PreconditionFailed",
            Self::EntityTooLarge { .. } => "EntityTooLarge",
            Self::EntityTooSmall { .. } => "EntityTooSmall",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::Timeout => "RequestTimeout",
            Self::ServiceUnavailable | Self::ConnectionFailed(_) => "ServiceUnavailable",
            Self::NotImplemented(_) => "NotImplemented",
            Self::Io(_)
            | Self::Internal(_)
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Database(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::AccessDenied.is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        let err = Error::ObjectNotFound {
            bucket: "b".into(),
            key: "k".into(),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::BucketNotFound("b".into()).http_status_code(), 404);
        assert_eq!(Error::AccessDenied.http_status_code(), 403);
        assert_eq!(Error::InvalidRange.http_status_code(), 416);
    }

    #[test]
    fn test_error_s3_code() {
        assert_eq!(Error::AccessDenied.s3_error_code(), "AccessDenied");
        assert_eq!(
            Error::NoSuchUpload {
                upload_id: "x".into()
            }
            .s3_error_code(),
            "NoSuchUpload"
        );
    }
}
