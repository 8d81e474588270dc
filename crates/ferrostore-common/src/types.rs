//! Shared identifiers and validated wire types for ferrostore.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque tenant identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque user identifier, unique within a tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque bucket identifier (distinct from the bucket's human-readable name,
/// since names can be freed and reused after a bucket is deleted).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct BucketId(pub Uuid);

impl BucketId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque object version identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct VersionId(pub Uuid);

impl VersionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Multipart upload identifier, opaque to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct UploadId(pub Uuid);

impl UploadId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Cluster peer node identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct ClusterNodeId(pub Uuid);

impl ClusterNodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClusterNodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated S3 bucket name.
///
/// Enforces the same rules as AWS: 3-63 characters, lowercase ASCII letters,
/// digits, hyphens and periods, must start/end with a letter or digit, no
/// consecutive periods, and must not be formatted like an IPv4 address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Validate and construct a bucket name.
    pub fn parse(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), BucketNameError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(BucketNameError::InvalidLength(name.len()));
        }

        let first = name.as_bytes()[0];
        let last = name.as_bytes()[name.len() - 1];
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(BucketNameError::InvalidStart);
        }
        if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
            return Err(BucketNameError::InvalidEnd);
        }

        let mut prev_period = false;
        for c in name.chars() {
            let ok = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
            if !ok {
                return Err(BucketNameError::InvalidCharacter(c));
            }
            if c == '.' {
                if prev_period {
                    return Err(BucketNameError::ConsecutivePeriods);
                }
                prev_period = true;
            } else {
                prev_period = false;
            }
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(BucketNameError::LooksLikeIpAddress);
        }

        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BucketName {
    type Error = BucketNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BucketName> for String {
    fn from(value: BucketName) -> Self {
        value.0
    }
}

/// Reasons a candidate bucket name fails validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name must be between 3 and 63 characters, got {0}")]
    InvalidLength(usize),
    #[error("bucket name must start with a lowercase letter or digit")]
    InvalidStart,
    #[error("bucket name must end with a lowercase letter or digit")]
    InvalidEnd,
    #[error("bucket name contains invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("bucket name must not contain consecutive periods")]
    ConsecutivePeriods,
    #[error("bucket name must not be formatted as an IP address")]
    LooksLikeIpAddress,
}

/// A validated S3 object key.
///
/// AWS permits almost any UTF-8 sequence up to 1024 bytes; we only reject the
/// empty key and oversized keys, leaving byte-level safety to path sandboxing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ObjectKeyError::Empty);
        }
        if key.len() > 1024 {
            return Err(ObjectKeyError::TooLong(key.len()));
        }
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = ObjectKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectKey> for String {
    fn from(value: ObjectKey) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectKeyError {
    #[error("object key must not be empty")]
    Empty,
    #[error("object key must be at most 1024 bytes, got {0}")]
    TooLong(usize),
}

/// Object Lock retention mode (§4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectLockMode {
    Governance,
    Compliance,
}

/// S3-compatible storage classes this deployment reports/accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Standard,
    ReducedRedundancy,
}

impl Default for StorageClass {
    fn default() -> Self {
        Self::Standard
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("STANDARD"),
            Self::ReducedRedundancy => f.write_str("REDUCED_REDUNDANCY"),
        }
    }
}

/// Membership/health state of a cluster peer (§4.11).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Suspect,
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_valid() {
        assert!(BucketName::parse("my-bucket").is_ok());
        assert!(BucketName::parse("abc").is_ok());
        assert!(BucketName::parse("a.b.c").is_ok());
    }

    #[test]
    fn test_bucket_name_invalid() {
        assert!(BucketName::parse("ab").is_err());
        assert!(BucketName::parse("-bucket").is_err());
        assert!(BucketName::parse("Bucket").is_err());
        assert!(BucketName::parse("bucket..name").is_err());
        assert!(BucketName::parse("192.168.1.1").is_err());
    }

    #[test]
    fn test_object_key_valid() {
        assert!(ObjectKey::parse("path/to/object.txt").is_ok());
        assert!(ObjectKey::parse("").is_err());
    }

    #[test]
    fn test_id_newtypes_unique() {
        assert_ne!(TenantId::new(), TenantId::new());
        assert_ne!(UploadId::new(), UploadId::new());
    }
}
