//! Outbound SigV4 request signing for the external replication executor.
//!
//! `ferrostore-auth`'s `SigV4Verifier` checks signatures on *inbound*
//! requests against stored keys; this is the mirror image, signing
//! *outgoing* requests to a destination bucket with a rule's configured
//! credentials. Same canonicalization and key-derivation algorithm as
//! `ferrostore_auth::sigv4`, just run forwards instead of backwards.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub struct OutboundSigner<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// Computed `Authorization` header value plus the `x-amz-date` it was signed
/// against, so the caller can attach both to the outgoing request.
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

impl<'a> OutboundSigner<'a> {
    #[must_use]
    pub const fn new(access_key_id: &'a str, secret_access_key: &'a str, region: &'a str) -> Self {
        Self { access_key_id, secret_access_key, region, service: "s3" }
    }

    /// Sign a request to `host` for `method`/`path` with the given
    /// already-URL-encoded `query` and request `body`. Only `host` and
    /// `x-amz-date`/`x-amz-content-sha256` are included as signed headers —
    /// a minimal signed-header set since the destination is always the
    /// managed replication client, not a browser.
    #[must_use]
    pub fn sign(&self, method: &str, host: &str, path: &str, query: &str, body: &[u8]) -> SignedHeaders {
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = &amz_date[..8];
        let content_sha256 = hex_sha256(body);

        let canonical_query = canonicalize_query(query);
        let mut headers: BTreeMap<&str, String> = BTreeMap::new();
        headers.insert("host", host.to_string());
        headers.insert("x-amz-content-sha256", content_sha256.clone());
        headers.insert("x-amz-date", amz_date.clone());

        let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
        let signed_headers_list = headers.keys().copied().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{signed_headers_list}\n{content_sha256}"
        );

        let credential_scope = format!("{date_stamp}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = self.derive_signing_key(date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers_list}, Signature={signature}",
            self.access_key_id
        );

        SignedHeaders { authorization, amz_date, content_sha256 }
    }

    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn canonicalize_query(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }
    let mut params: Vec<&str> = query.split('&').collect();
    params.sort_unstable();
    params.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic_within_the_same_second() {
        let signer = OutboundSigner::new("AKID", "secret", "us-east-1");
        let a = signer.sign("PUT", "dest.example.com", "/bucket/key", "", b"body");
        assert!(a.authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
        assert!(a.authorization.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn test_canonicalize_query_sorts_params() {
        assert_eq!(canonicalize_query("b=2&a=1"), "a=1&b=2");
        assert_eq!(canonicalize_query(""), "");
    }
}
