//! Object store access.
//!
//! The gateway reads everything it serves from an S3-compatible bucket:
//! static assets, per-domain TLS material, and pending ACME challenge
//! tokens. Handlers go through the [`ObjectStore`] trait so tests can
//! substitute an in-memory store; [`S3Store`] is the production
//! implementation.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::config::BucketConfig;

/// Deadline for object metadata (response headers). Body streaming has no
/// wall clock; slow downloads are bounded by the caller.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Object-store failure, with not-found kept distinct so callers can
/// negative-cache it.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found")]
    NotFound,
    #[error("object store error: {0}")]
    Transient(String),
}

/// Byte stream of an object body.
pub type BlobBody = BoxStream<'static, Result<Bytes, io::Error>>;

/// An object fetched from the store: metadata plus a streaming body.
pub struct BlobObject {
    pub content_length: Option<u64>,
    pub last_modified: Option<SystemTime>,
    /// `Content-Encoding` the object was uploaded with, if any. Assets
    /// pre-compressed by the build pipeline arrive as `gzip`.
    pub content_encoding: Option<String>,
    pub body: BlobBody,
}

impl BlobObject {
    /// Drains the body into one buffer. Only used for objects the caller
    /// already decided to buffer (cache-admitted artifacts, certificates,
    /// challenge tokens).
    pub async fn collect(self) -> Result<Bytes, BlobError> {
        let buf = self
            .body
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
            .map_err(|e| BlobError::Transient(e.to_string()))?;
        Ok(buf.freeze())
    }
}

/// Read access to the object store.
///
/// # Examples
///
/// ```rust,no_run
/// use origan_gateway::blob::{ObjectStore, static_asset_key};
///
/// # async fn example(store: &dyn ObjectStore) -> Result<(), Box<dyn std::error::Error>> {
/// let key = static_asset_key("dep-1", "app/index.html");
/// let object = store.get(&key).await?;
/// println!("{} bytes", object.content_length.unwrap_or(0));
/// let body = object.collect().await?;
/// # let _ = body;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one object. `NotFound` is a distinct outcome, not an error
    /// to retry.
    async fn get(&self, key: &str) -> Result<BlobObject, BlobError>;
}

/// Object key for a deployment's static asset.
pub fn static_asset_key(deployment_id: &str, resource_path: &str) -> String {
    format!("deployments/{deployment_id}/static/{resource_path}")
}

/// Object key for a hostname's certificate chain.
pub fn cert_chain_key(hostname: &str) -> String {
    format!("certs/{hostname}/chain")
}

/// Object key for a hostname's private key.
pub fn cert_private_key_key(hostname: &str) -> String {
    format!("certs/{hostname}/key")
}

/// Object key for a pending ACME HTTP-01 challenge token.
pub fn acme_challenge_key(token: &str) -> String {
    format!("acme-challenges/{token}")
}

/// S3-compatible store client.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Builds a client for the configured endpoint. Path-style addressing
    /// is forced so bucket names never become DNS labels (required by
    /// MinIO-style endpoints).
    pub fn new(config: &BucketConfig) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "origan-config",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.name.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<BlobObject, BlobError> {
        let send = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send();
        let output = tokio::time::timeout(METADATA_TIMEOUT, send)
            .await
            .map_err(|_| BlobError::Transient("object store metadata timeout".into()))?
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    BlobError::NotFound
                } else {
                    BlobError::Transient(err.to_string())
                }
            })?;

        let content_length = output.content_length().and_then(|len| u64::try_from(len).ok());
        let last_modified = output
            .last_modified()
            .and_then(|dt| u64::try_from(dt.secs()).ok())
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));
        let content_encoding = output.content_encoding().map(str::to_string);

        let body = tokio_util::io::ReaderStream::new(output.body.into_async_read());

        Ok(BlobObject {
            content_length,
            last_modified,
            content_encoding,
            body: Box::pin(body),
        })
    }
}

/// In-memory object store for tests and local development.
///
/// Objects are plain key → bytes pairs; `get` counts calls so tests can
/// assert single-flight behavior.
#[derive(Default)]
pub struct MemoryStore {
    objects: parking_lot::RwLock<std::collections::HashMap<String, Bytes>>,
    gets: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), bytes.into());
    }

    pub fn remove(&self, key: &str) {
        self.objects.write().remove(key);
    }

    /// Number of `get` calls served so far, hits and misses alike.
    pub fn get_count(&self) -> usize {
        self.gets.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<BlobObject, BlobError> {
        self.gets.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let bytes = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or(BlobError::NotFound)?;
        let len = bytes.len() as u64;
        Ok(BlobObject {
            content_length: Some(len),
            last_modified: Some(UNIX_EPOCH),
            content_encoding: None,
            body: Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(
            static_asset_key("dep-1", "app/index.html"),
            "deployments/dep-1/static/app/index.html"
        );
        assert_eq!(cert_chain_key("foo.app.example"), "certs/foo.app.example/chain");
        assert_eq!(cert_private_key_key("foo.app.example"), "certs/foo.app.example/key");
        assert_eq!(acme_challenge_key("abc123"), "acme-challenges/abc123");
    }

    #[tokio::test]
    async fn collect_concatenates_body() {
        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from("he")),
            Ok(Bytes::from("llo")),
        ]);
        let object = BlobObject {
            content_length: Some(5),
            last_modified: None,
            content_encoding: None,
            body: Box::pin(chunks),
        };
        assert_eq!(&object.collect().await.unwrap()[..], b"hello");
    }
}
