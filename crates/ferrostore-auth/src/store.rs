//! Thin adapter between the signature verifiers and [`ferrostore_meta::MetaStore`].
//!
//! The teacher crate kept an in-memory `HashMap` here; ferrostore's identities
//! are durable control-plane rows, so this wraps the metadata store instead.

use std::sync::Arc;

use ferrostore_meta::models::{AccessKey, User};
use ferrostore_meta::MetaStore;
use uuid::Uuid;

use crate::error::AuthError;

/// Looks up access keys and users for request authentication.
pub struct AuthUserStore {
    meta: Arc<MetaStore>,
}

impl AuthUserStore {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self { meta }
    }

    /// Resolve an access key id to its key and owning user, checking that
    /// both the key and the user are active. This is the entry point both
    /// [`crate::sigv4::SigV4Verifier`] and [`crate::sigv2::SigV2Verifier`] use.
    pub async fn lookup_for_auth(&self, access_key_id: &str) -> Result<(AccessKey, User), AuthError> {
        let key = self
            .meta
            .get_access_key(access_key_id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key_id.to_string()))?;

        if !key.active {
            return Err(AuthError::AccessKeyInactive);
        }

        let user = self
            .meta
            .get_user(key.user_id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or_else(|| AuthError::UserNotFound(key.user_id.to_string()))?;

        if user.status != ferrostore_meta::models::UserStatus::Active {
            return Err(AuthError::UserSuspended);
        }

        Ok((key, user))
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.meta
            .get_user(user_id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))
    }

    pub async fn get_user_by_username(&self, tenant_id: Uuid, username: &str) -> Result<User, AuthError> {
        self.meta
            .get_user_by_username(tenant_id, username)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or_else(|| AuthError::UserNotFound(username.to_string()))
    }

    pub async fn touch_access_key(&self, access_key_id: &str) -> Result<(), AuthError> {
        self.meta
            .touch_access_key(access_key_id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}
