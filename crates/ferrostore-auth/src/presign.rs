//! AWS SigV4 presigned URL generation and verification
//!
//! Generates pre-signed GET URLs for S3-compatible object storage and
//! verifies them on the way back in, running the generation logic in reverse.
//!
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use http::Request;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::store::AuthUserStore;
use crate::user::{user_arn, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Percent-encode a string for use in a URL query string value or path segment.
/// Leaves unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) unchanged.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(
                    char::from_digit(u32::from(b >> 4), 16)
                        .unwrap()
                        .to_ascii_uppercase(),
                );
                out.push(
                    char::from_digit(u32::from(b & 0xf), 16)
                        .unwrap()
                        .to_ascii_uppercase(),
                );
            }
        }
    }
    out
}

/// Generate a presigned S3 GET URL.
///
/// # Arguments
/// - `endpoint` — base URL of the gateway (e.g. `http://localhost:9000`)
/// - `region` — AWS region string used in the credential scope (e.g. `"us-east-1"`)
/// - `access_key_id` — access key ID credential
/// - `secret_access_key` — secret access key used to sign
/// - `bucket` — bucket name
/// - `key` — object key (path inside bucket)
/// - `expires_in` — how long the URL should be valid
///
/// The returned URL can be fetched with a plain HTTP GET without any additional headers.
pub fn presign_get(
    endpoint: &str,
    region: &str,
    access_key_id: &str,
    secret_access_key: &str,
    bucket: &str,
    key: &str,
    expires_in: Duration,
) -> String {
    let now = Utc::now();
    let date_str = now.format("%Y%m%d").to_string();
    let datetime_str = now.format("%Y%m%dT%H%M%SZ").to_string();
    let expires_secs = expires_in.as_secs();

    let service = "s3";
    let credential_scope = format!("{date_str}/{region}/{service}/aws4_request");
    let credential = format!("{access_key_id}/{credential_scope}");

    // The host header value (stripped of scheme)
    let host = endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    // Canonical query string (parameters must be sorted)
    let canonical_qs = format!(
        "X-Amz-Algorithm=AWS4-HMAC-SHA256\
         &X-Amz-Credential={cred}\
         &X-Amz-Date={dt}\
         &X-Amz-Expires={exp}\
         &X-Amz-SignedHeaders=host",
        cred = uri_encode(&credential),
        dt = datetime_str,
        exp = expires_secs,
    );

    // Canonical URI: /{bucket}/{key} (each segment percent-encoded except '/')
    let canonical_uri = format!(
        "/{}/{}",
        uri_encode(bucket),
        key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
    );

    // Canonical headers and signed headers
    let canonical_headers = format!("host:{host}\n");
    let signed_headers = "host";

    // Canonical request (payload is UNSIGNED for presigned GETs)
    let canonical_request = format!(
        "GET\n{uri}\n{qs}\n{headers}\n{signed_hdr}\nUNSIGNED-PAYLOAD",
        uri = canonical_uri,
        qs = canonical_qs,
        headers = canonical_headers,
        signed_hdr = signed_headers,
    );

    // String to sign
    let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{dt}\n{scope}\n{hash}",
        dt = datetime_str,
        scope = credential_scope,
        hash = cr_hash,
    );

    // Derive signing key
    let signing_key = derive_signing_key(secret_access_key, &date_str, region, service);

    // Compute signature
    let mut mac = HmacSha256::new_from_slice(&signing_key).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    // Build final URL
    format!(
        "{endpoint}{uri}?{qs}&X-Amz-Signature={sig}",
        endpoint = endpoint.trim_end_matches('/'),
        uri = canonical_uri,
        qs = canonical_qs,
        sig = signature,
    )
}

/// Verify a presigned GET request, running [`presign_get`]'s canonicalization
/// and signing steps in reverse against the query string the client sent.
pub async fn verify_presigned_url<B>(
    request: &Request<B>,
    user_store: &AuthUserStore,
    region: &str,
) -> Result<AuthResult, AuthError> {
    let query = request.uri().query().unwrap_or("");
    let params = parse_query(query);

    let algorithm = params.get("X-Amz-Algorithm").ok_or(AuthError::MissingCredential)?;
    if algorithm != "AWS4-HMAC-SHA256" {
        return Err(AuthError::InvalidSignatureVersion);
    }
    let credential = params.get("X-Amz-Credential").ok_or(AuthError::MissingCredential)?;
    let datetime_str = params.get("X-Amz-Date").ok_or(AuthError::MissingDateHeader)?;
    let expires_secs: i64 = params
        .get("X-Amz-Expires")
        .ok_or(AuthError::InvalidCredentialFormat)?
        .parse()
        .map_err(|_| AuthError::InvalidCredentialFormat)?;
    let signed_headers = params
        .get("X-Amz-SignedHeaders")
        .ok_or(AuthError::InvalidCredentialFormat)?;
    let signature = params.get("X-Amz-Signature").ok_or(AuthError::SignatureMismatch)?;

    let mut cred_parts = credential.splitn(5, '/');
    let access_key_id = cred_parts.next().ok_or(AuthError::InvalidCredentialFormat)?;
    let date_str = cred_parts.next().ok_or(AuthError::InvalidCredentialFormat)?;
    let cred_region = cred_parts.next().unwrap_or("");
    let service = cred_parts.next().unwrap_or("s3");

    let signed_at = NaiveDateTime::parse_from_str(datetime_str, "%Y%m%dT%H%M%SZ")
        .map_err(|_| AuthError::InvalidDateFormat)?
        .and_utc();
    let expiry = signed_at + chrono::Duration::seconds(expires_secs);
    if Utc::now() > expiry {
        return Err(AuthError::PresignedUrlExpired);
    }

    let (access_key, user) = user_store.lookup_for_auth(access_key_id).await?;

    let host = request
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let canonical_uri = request.uri().path();
    let canonical_qs = canonical_query_excluding_signature(&params);
    let canonical_headers = format!("host:{host}\n");
    let canonical_request = format!(
        "{method}\n{uri}\n{qs}\n{headers}\n{signed_hdr}\nUNSIGNED-PAYLOAD",
        method = request.method().as_str(),
        uri = canonical_uri,
        qs = canonical_qs,
        headers = canonical_headers,
        signed_hdr = signed_headers,
    );

    let credential_scope = format!("{date_str}/{cred_region}/{service}/aws4_request");
    let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("AWS4-HMAC-SHA256\n{datetime_str}\n{credential_scope}\n{cr_hash}");

    let signing_key = derive_signing_key(&access_key.secret_access_key, date_str, region, service);
    let mut mac = HmacSha256::new_from_slice(&signing_key).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(&expected_signature, signature) {
        return Err(AuthError::PresignedUrlSignatureMismatch);
    }

    let group_arns = user
        .roles
        .iter()
        .map(|r| format!("arn:aws:iam::{}:group/{r}", user.tenant_id))
        .collect();

    Ok(AuthResult {
        user_id: user.id,
        tenant_id: user.tenant_id,
        user_arn: user_arn(user.tenant_id, &user.username),
        access_key_id: access_key.access_key_id,
        roles: user.roles,
        group_arns,
    })
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|param| {
            let mut parts = param.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((percent_decode(key), percent_decode(value)))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn canonical_query_excluding_signature(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != "X-Amz-Signature")
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Derive the SigV4 signing key from the secret access key and scope components.
fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presign_produces_valid_url() {
        let url = presign_get(
            "http://localhost:9000",
            "us-east-1",
            "AKID",
            "secret",
            "my-bucket",
            "path/to/file.parquet",
            Duration::from_secs(3600),
        );
        assert!(url.starts_with("http://localhost:9000/my-bucket/path/to/file.parquet"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_presign_roundtrip_verifies() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        ferrostore_meta::Migrator::new(pool.clone(), ferrostore_meta::schema::metadata_migrations())
            .migrate()
            .await
            .unwrap();
        let meta = ferrostore_meta::MetaStore::new(pool.clone());
        let tenant = meta.create_tenant("acme").await.unwrap();
        let user_id = meta
            .create_user(tenant.id, "alice", None, &["readonly".to_string()])
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO access_keys (access_key_id, secret_access_key, user_id, tenant_id, active, created_at) \
             VALUES ('AKID', 'secret', ?, ?, 1, ?)",
        )
        .bind(user_id.to_string())
        .bind(tenant.id.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let url = presign_get(
            "http://localhost:9000",
            "us-east-1",
            "AKID",
            "secret",
            "my-bucket",
            "path/to/file.parquet",
            Duration::from_secs(3600),
        );

        let path_and_query = url.splitn(2, "localhost:9000").nth(1).unwrap();
        let request = Request::builder()
            .method("GET")
            .uri(path_and_query)
            .header("host", "localhost:9000")
            .body(())
            .unwrap();

        let store = AuthUserStore::new(Arc::new(meta));
        let result = verify_presigned_url(&request, &store, "us-east-1").await.unwrap();
        assert_eq!(result.access_key_id, "AKID");
    }
}
