//! HS256 JWT issuance and verification for the console/admin API session tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id
    pub sub: String,
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl JwtIssuer {
    #[must_use]
    pub fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: Uuid, tenant_id: Uuid, roles: &[String]) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            roles: roles.to_vec(),
            exp: now + self.ttl_seconds,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let issuer = JwtIssuer::new(b"test-secret", 3600);
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let token = issuer.issue(user_id, tenant_id, &["admin".to_string()]).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.tenant_id, tenant_id.to_string());
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let issuer = JwtIssuer::new(b"test-secret", 3600);
        let token = issuer.issue(Uuid::new_v4(), Uuid::new_v4(), &[]).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(issuer.verify(&tampered).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let issuer = JwtIssuer::new(b"test-secret", -1);
        let token = issuer.issue(Uuid::new_v4(), Uuid::new_v4(), &[]).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AuthError::InvalidToken)));
    }
}
