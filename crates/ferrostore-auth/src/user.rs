//! Authentication result type shared by the SigV4 and SigV2 verifiers.
//!
//! User and access-key records themselves live in [`ferrostore_meta::models`];
//! this crate only consumes them through [`crate::store::AuthUserStore`].

use uuid::Uuid;

/// Outcome of a successful request-signature verification.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub user_arn: String,
    pub access_key_id: String,
    pub roles: Vec<String>,
    /// ARNs of IAM groups the user belongs to, for `aws:PrincipalGroup` policy conditions.
    pub group_arns: Vec<String>,
}

impl AuthResult {
    pub fn user_arn(&self) -> &str {
        &self.user_arn
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }
}

/// Builds the canonical ARN for a user within a tenant, e.g.
/// `arn:aws:iam::<tenant_id>:user/<username>`.
pub fn user_arn(tenant_id: Uuid, username: &str) -> String {
    format!("arn:aws:iam::{tenant_id}:user/{username}")
}
