//! JSON sidecar metadata (`<path>.metadata`), §4.2.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DIRECTORY_MARKER: &str = ".maxiofs-folder";
pub const DIRECTORY_ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Sidecar file content. `size`/`etag`/`last_modified` are always computed by
/// the backend; `custom` carries caller-supplied `x-amz-meta-*` keys and
/// never overrides the computed fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: u64,
    pub etag: String,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl ObjectMetadata {
    #[must_use]
    pub fn directory(last_modified: DateTime<Utc>) -> Self {
        Self {
            size: 0,
            etag: DIRECTORY_ETAG.to_string(),
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            last_modified,
            custom: HashMap::new(),
        }
    }
}

/// An entry returned from `List`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub path: String,
    pub is_directory: bool,
    pub metadata: ObjectMetadata,
}
