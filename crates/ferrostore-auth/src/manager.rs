//! Ties signature verification, bucket policy evaluation, ACLs and explicit
//! grants together into the two permission checks the S3 protocol handler
//! calls on every request.
//!
//! Evaluation order for both checks:
//!   1. global admin role shortcut -> Allow
//!   2. bucket policy (explicit Deny short-circuits, explicit Allow wins)
//!   3. bucket ACL
//!   4. bucket-permissions table (explicit per-grantee grant)
//!   5. owner-by-tenant fallback (bucket owner/tenant match the caller)
//!   6. deny

use chrono::Utc;
use ferrostore_meta::models::Bucket;
use ferrostore_meta::MetaStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AuthError;
use crate::policy::{BucketPolicy, PolicyDecision, PolicyEvaluator, RequestContext};
use crate::user::AuthResult;

/// A single ACL grant as stored in `buckets.acl_json` / an object's ACL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AclGrant {
    pub grantee: String,
    pub permission: String,
}

pub struct AuthManager {
    meta: Arc<MetaStore>,
    evaluator: PolicyEvaluator,
}

impl AuthManager {
    #[must_use]
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self {
            meta,
            evaluator: PolicyEvaluator,
        }
    }

    pub async fn check_bucket_permission(
        &self,
        auth: &AuthResult,
        bucket: &Bucket,
        action: &str,
        resource_arn: &str,
    ) -> Result<(), AuthError> {
        if auth.is_admin() {
            return Ok(());
        }

        if let Some(policy_json) = &bucket.policy_json {
            match serde_json::from_str::<BucketPolicy>(policy_json) {
                Ok(policy) => {
                    let context = RequestContext::new(auth.user_arn().to_string(), action.to_string(), resource_arn.to_string())
                        .with_multi_variable("aws:PrincipalGroup", auth.group_arns.clone());
                    match self.evaluator.evaluate(&policy, &context) {
                        PolicyDecision::Deny => return Err(AuthError::AccessDenied),
                        PolicyDecision::Allow => return Ok(()),
                        PolicyDecision::ImplicitDeny => {}
                    }
                }
                Err(e) => tracing::warn!(bucket = %bucket.name, error = %e, "bucket policy failed to parse"),
            }
        }

        if let Some(acl_json) = &bucket.acl_json
            && acl_allows(acl_json, auth, action)
        {
            return Ok(());
        }

        let grants = self
            .meta
            .list_bucket_permissions(bucket.id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let now = Utc::now();
        for grant in &grants {
            if let Some(expires) = grant.expires_at
                && expires < now
            {
                continue;
            }
            let grantee_matches = (grant.grantee_type == "user" && grant.grantee_id == auth.user_id.to_string())
                || (grant.grantee_type == "group" && auth.group_arns.iter().any(|g| g == &grant.grantee_id));
            if grantee_matches && action_matches_any(&grant.actions, action) {
                return Ok(());
            }
        }

        if bucket.owner_user_id == auth.user_id || bucket.tenant_id == auth.tenant_id {
            return Ok(());
        }

        Err(AuthError::AccessDenied)
    }

    pub async fn check_object_permission(
        &self,
        auth: &AuthResult,
        bucket: &Bucket,
        object_acl_json: Option<&str>,
        action: &str,
        resource_arn: &str,
    ) -> Result<(), AuthError> {
        if auth.is_admin() {
            return Ok(());
        }

        if let Some(acl_json) = object_acl_json
            && acl_allows(acl_json, auth, action)
        {
            return Ok(());
        }

        self.check_bucket_permission(auth, bucket, action, resource_arn).await
    }
}

fn acl_allows(acl_json: &str, auth: &AuthResult, action: &str) -> bool {
    let Ok(grants) = serde_json::from_str::<Vec<AclGrant>>(acl_json) else {
        return false;
    };
    let permission = if action.contains("Get") || action.contains("List") || action.contains("Head") {
        "READ"
    } else {
        "WRITE"
    };
    grants.iter().any(|g| {
        (g.grantee == "AllUsers" || g.grantee == auth.user_id.to_string())
            && (g.permission == permission || g.permission == "FULL_CONTROL")
    })
}

fn action_matches_any(granted: &[String], action: &str) -> bool {
    granted.iter().any(|g| g == "*" || g == action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrostore_meta::models::VersioningState;
    use uuid::Uuid;

    fn auth_result(user_id: Uuid, tenant_id: Uuid, roles: Vec<String>) -> AuthResult {
        AuthResult {
            user_id,
            tenant_id,
            user_arn: format!("arn:aws:iam::{tenant_id}:user/test"),
            access_key_id: "AKID".to_string(),
            roles,
            group_arns: Vec::new(),
        }
    }

    fn bucket(tenant_id: Uuid, owner_user_id: Uuid) -> Bucket {
        Bucket {
            id: Uuid::new_v4(),
            tenant_id,
            name: "test-bucket".to_string(),
            owner_user_id,
            versioning: VersioningState::Unversioned,
            policy_json: None,
            cors_json: None,
            lifecycle_json: None,
            tags_json: None,
            object_lock_json: None,
            acl_json: None,
            object_count: 0,
            current_storage_bytes: 0,
            deleting: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_acl_allows_all_users_read() {
        let auth = auth_result(Uuid::new_v4(), Uuid::new_v4(), vec![]);
        let acl = serde_json::to_string(&vec![AclGrant {
            grantee: "AllUsers".to_string(),
            permission: "READ".to_string(),
        }])
        .unwrap();
        assert!(acl_allows(&acl, &auth, "s3:GetObject"));
        assert!(!acl_allows(&acl, &auth, "s3:PutObject"));
    }

    #[test]
    fn test_admin_shortcut_bypasses_everything() {
        let auth = auth_result(Uuid::new_v4(), Uuid::new_v4(), vec!["admin".to_string()]);
        assert!(auth.is_admin());
    }

    #[test]
    fn test_action_matches_any_wildcard() {
        assert!(action_matches_any(&["*".to_string()], "s3:DeleteObject"));
        assert!(action_matches_any(&["s3:GetObject".to_string()], "s3:GetObject"));
        assert!(!action_matches_any(&["s3:GetObject".to_string()], "s3:PutObject"));
    }

    #[test]
    fn test_owner_tenant_fallback_fields() {
        let tenant_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let b = bucket(tenant_id, owner);
        assert_eq!(b.tenant_id, tenant_id);
        assert_eq!(b.owner_user_id, owner);
    }
}
