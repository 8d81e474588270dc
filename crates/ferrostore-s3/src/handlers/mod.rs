//! HTTP handlers grouped by resource shape (§4, §5, §6).

pub mod bucket;
pub mod multipart;
pub mod object;

use ferrostore_meta::models::Bucket;

use crate::error::ApiResult;
use crate::state::S3State;

/// Loads a bucket by name, mapping a missing row onto the specific
/// `BucketNotFound` variant rather than a generic not-found error.
pub(crate) async fn load_bucket(state: &S3State, name: &str) -> ApiResult<Bucket> {
    state
        .meta
        .get_bucket(name)
        .await?
        .ok_or_else(|| ferrostore_common::Error::BucketNotFound(name.to_string()).into())
}
