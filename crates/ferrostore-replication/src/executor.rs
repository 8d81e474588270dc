//! Pluggable replication destinations (§4.10, §9's "pluggable executor" note).
//!
//! One [`ReplicationExecutor`] trait, two implementations: [`ExternalS3Executor`]
//! ships bytes to an AWS-S3-compatible endpoint over `reqwest`, signing each
//! request with the rule's own SigV4 credentials; [`ClusterExecutor`] calls a
//! peer node's own S3-shaped endpoint, authenticating with the shared cluster
//! token instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ReplicationError, ReplicationResult};
use crate::sign::OutboundSigner;

/// Everything an executor needs to replicate one object version.
#[derive(Clone, Debug)]
pub struct ReplicationObject {
    pub key: String,
    pub etag: String,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ReplicationExecutor: Send + Sync {
    async fn put_object(
        &self,
        destination_bucket: &str,
        object: &ReplicationObject,
        body: Vec<u8>,
    ) -> ReplicationResult<()>;

    async fn delete_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<()>;

    /// Last-modified time of the object at the destination, if it exists —
    /// used by `last_write_wins` conflict resolution.
    async fn head_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<Option<DateTime<Utc>>>;
}

/// Replicates to an external AWS-S3-compatible endpoint using path-style
/// requests (`https://<endpoint>/<bucket>/<key>`), signed with the
/// destination access/secret key pair stored on the rule.
pub struct ExternalS3Executor {
    client: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    secret_access_key: String,
    region: String,
}

impl ExternalS3Executor {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, access_key_id: impl Into<String>, secret_access_key: impl Into<String>, region: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with static TLS config always builds");
        Self {
            client,
            endpoint: endpoint.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint.trim_end_matches('/'))
    }

    fn host(&self) -> &str {
        self.endpoint.trim_start_matches("https://").trim_start_matches("http://").trim_end_matches('/')
    }

    fn signer(&self) -> OutboundSigner<'_> {
        OutboundSigner::new(&self.access_key_id, &self.secret_access_key, &self.region)
    }
}

#[async_trait]
impl ReplicationExecutor for ExternalS3Executor {
    async fn put_object(&self, destination_bucket: &str, object: &ReplicationObject, body: Vec<u8>) -> ReplicationResult<()> {
        let path = format!("/{destination_bucket}/{}", object.key);
        let signed = self.signer().sign("PUT", self.host(), &path, "", &body);

        let mut request = self
            .client
            .put(self.object_url(destination_bucket, &object.key))
            .header("host", self.host())
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("authorization", &signed.authorization)
            .header("content-type", &object.content_type);

        for (k, v) in &object.metadata {
            request = request.header(format!("x-amz-meta-{k}"), v);
        }

        let response = request.body(body).send().await.map_err(|e| ReplicationError::Transport(e.to_string()))?;
        ensure_success(response).await
    }

    async fn delete_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<()> {
        let path = format!("/{destination_bucket}/{key}");
        let signed = self.signer().sign("DELETE", self.host(), &path, "", b"");

        let response = self
            .client
            .delete(self.object_url(destination_bucket, key))
            .header("host", self.host())
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("authorization", &signed.authorization)
            .send()
            .await
            .map_err(|e| ReplicationError::Transport(e.to_string()))?;
        ensure_success(response).await
    }

    async fn head_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<Option<DateTime<Utc>>> {
        let path = format!("/{destination_bucket}/{key}");
        let signed = self.signer().sign("HEAD", self.host(), &path, "", b"");

        let response = self
            .client
            .head(self.object_url(destination_bucket, key))
            .header("host", self.host())
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.content_sha256)
            .header("authorization", &signed.authorization)
            .send()
            .await
            .map_err(|e| ReplicationError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ReplicationError::Destination(format!("HEAD returned {}", response.status())));
        }
        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(last_modified)
    }
}

/// Replicates to a peer node within the same cluster, over the peer's own
/// S3-shaped endpoint, authenticated with the shared cluster token instead
/// of a per-user access key pair.
pub struct ClusterExecutor {
    client: reqwest::Client,
    peer_endpoint: String,
    shared_token: String,
}

impl ClusterExecutor {
    #[must_use]
    pub fn new(peer_endpoint: impl Into<String>, shared_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with static TLS config always builds");
        Self { client, peer_endpoint: peer_endpoint.into(), shared_token: shared_token.into() }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.peer_endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl ReplicationExecutor for ClusterExecutor {
    async fn put_object(&self, destination_bucket: &str, object: &ReplicationObject, body: Vec<u8>) -> ReplicationResult<()> {
        let mut request = self
            .client
            .put(self.object_url(destination_bucket, &object.key))
            .header("x-ferrostore-cluster-token", &self.shared_token)
            .header("content-type", &object.content_type);
        for (k, v) in &object.metadata {
            request = request.header(format!("x-amz-meta-{k}"), v);
        }
        let response = request.body(body).send().await.map_err(|e| ReplicationError::Transport(e.to_string()))?;
        ensure_success(response).await
    }

    async fn delete_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<()> {
        let response = self
            .client
            .delete(self.object_url(destination_bucket, key))
            .header("x-ferrostore-cluster-token", &self.shared_token)
            .send()
            .await
            .map_err(|e| ReplicationError::Transport(e.to_string()))?;
        ensure_success(response).await
    }

    async fn head_object(&self, destination_bucket: &str, key: &str) -> ReplicationResult<Option<DateTime<Utc>>> {
        let response = self
            .client
            .head(self.object_url(destination_bucket, key))
            .header("x-ferrostore-cluster-token", &self.shared_token)
            .send()
            .await
            .map_err(|e| ReplicationError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ReplicationError::Destination(format!("HEAD returned {}", response.status())));
        }
        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(last_modified)
    }
}

async fn ensure_success(response: reqwest::Response) -> ReplicationResult<()> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ReplicationError::Destination(format!("{status}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_executor_builds_path_style_url() {
        let exec = ExternalS3Executor::new("https://s3.example.com", "AKID", "secret", "us-east-1");
        assert_eq!(exec.object_url("my-bucket", "a/b.txt"), "https://s3.example.com/my-bucket/a/b.txt");
        assert_eq!(exec.host(), "s3.example.com");
    }

    #[test]
    fn test_cluster_executor_builds_path_style_url() {
        let exec = ClusterExecutor::new("https://peer-1.internal:9000/", "token");
        assert_eq!(exec.object_url("my-bucket", "a.txt"), "https://peer-1.internal:9000/my-bucket/a.txt");
    }
}
