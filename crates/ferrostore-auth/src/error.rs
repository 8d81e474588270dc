//! Authentication error types

use thiserror::Error;

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingAuthHeader,

    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    #[error("invalid signature version: expected AWS4-HMAC-SHA256")]
    InvalidSignatureVersion,

    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential format")]
    InvalidCredentialFormat,

    #[error("access key not found: {0}")]
    AccessKeyNotFound(String),

    #[error("access key is inactive")]
    AccessKeyInactive,

    #[error("user is suspended")]
    UserSuspended,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("request has expired")]
    RequestExpired,

    #[error("missing required signed header: {0}")]
    MissingSignedHeader(String),

    #[error("invalid date format")]
    InvalidDateFormat,

    #[error("missing x-amz-date or date header")]
    MissingDateHeader,

    #[error("access denied")]
    AccessDenied,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    #[error("account locked until {0}")]
    AccountLocked(chrono::DateTime<chrono::Utc>),

    #[error("invalid password")]
    InvalidPassword,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("token issuance failed: {0}")]
    TokenIssue(String),

    #[error("invalid TOTP code")]
    InvalidTotpCode,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("presigned URL has expired")]
    PresignedUrlExpired,

    #[error("presigned URL signature mismatch")]
    PresignedUrlSignatureMismatch,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ferrostore_common::Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccessDenied => Self::AccessDenied,
            AuthError::AccountLocked(_) | AuthError::UserSuspended | AuthError::AccessKeyInactive => {
                Self::AccessDenied
            }
            AuthError::RateLimited => Self::invalid_request("rate limit exceeded"),
            other => Self::invalid_request(other.to_string()),
        }
    }
}
