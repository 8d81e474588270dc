//! Request authentication (§4.4): tries SigV4, falls back to SigV2, falls
//! back to a presigned-URL query string, then hands the result to
//! [`ferrostore_auth::AuthManager`] for bucket/object authorization.

use std::sync::Arc;

use axum::http::Request;
use ferrostore_auth::{AuthError, AuthManager, AuthResult, AuthUserStore, SigV2Verifier, SigV4Verifier};
use ferrostore_meta::models::Bucket;

/// Builds the ARN for an object within a bucket.
#[must_use]
pub fn object_arn(bucket: &str, key: &str) -> String {
    format!("arn:aws:s3:::{bucket}/{key}")
}

#[must_use]
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

pub struct RequestAuthenticator {
    user_store: Arc<AuthUserStore>,
    sigv4: SigV4Verifier,
    sigv2: SigV2Verifier,
    manager: AuthManager,
    region: String,
}

impl RequestAuthenticator {
    #[must_use]
    pub fn new(user_store: Arc<AuthUserStore>, manager: AuthManager, region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            sigv4: SigV4Verifier::new(Arc::clone(&user_store), region.clone()),
            sigv2: SigV2Verifier::new(Arc::clone(&user_store)),
            user_store,
            manager,
            region,
        }
    }

    /// Authenticate an incoming request: presigned query string first (it
    /// carries its own credential independent of the `Authorization`
    /// header), then the `Authorization` header as SigV4, falling back to
    /// the legacy SigV2 scheme.
    pub async fn authenticate<B>(&self, request: &Request<B>) -> Result<AuthResult, AuthError> {
        if let Some(query) = request.uri().query()
            && query.contains("X-Amz-Signature=")
        {
            return ferrostore_auth::verify_presigned_url(request, &self.user_store, &self.region).await;
        }

        match self.sigv4.verify(request).await {
            Ok(result) => Ok(result),
            Err(AuthError::InvalidSignatureVersion) => self.sigv2.verify(request).await,
            Err(e) => Err(e),
        }
    }

    pub async fn authorize_bucket(&self, auth: &AuthResult, bucket: &Bucket, action: &str) -> Result<(), AuthError> {
        self.manager
            .check_bucket_permission(auth, bucket, action, &bucket_arn(&bucket.name))
            .await
    }

    pub async fn authorize_object(
        &self,
        auth: &AuthResult,
        bucket: &Bucket,
        key: &str,
        object_acl_json: Option<&str>,
        action: &str,
    ) -> Result<(), AuthError> {
        self.manager
            .check_object_permission(auth, bucket, object_acl_json, action, &object_arn(&bucket.name, key))
            .await
    }
}
