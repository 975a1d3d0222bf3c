//! Control plane client.
//!
//! One RPC matters on the request path: resolving a hostname to its
//! deployment descriptor. The wire protocol is HTTP+JSON
//! (`GET {base}/v1/domains/{hostname}`); the transport is a pooled hyper
//! client. Only the config cache calls this, on cache miss.

use std::time::Duration;

use async_trait::async_trait;
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::{debug, warn};

use crate::body::GatewayBody;
use crate::manifest::DeploymentDescriptor;

/// Deadline for a single resolve attempt.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Retries after the first attempt. Backoff triples from
/// [`BACKOFF_BASE`].
pub const RESOLVE_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Control plane failure modes. `NotFound` is authoritative ("no such
/// domain"); `Unavailable` means the caller may fall back to a stale
/// cache entry.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("domain not found")]
    NotFound,
    #[error("control plane unavailable: {0}")]
    Unavailable(String),
}

/// Domain resolution against the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn resolve_domain(&self, hostname: &str) -> Result<DeploymentDescriptor, ControlError>;
}

/// HTTP+JSON control plane client.
pub struct HttpControlClient {
    client: Client<HttpConnector, GatewayBody>,
    base_url: String,
}

impl HttpControlClient {
    pub fn new(base_url: &str) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(Duration::from_secs(1)));
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn attempt(&self, hostname: &str) -> Result<DeploymentDescriptor, ControlError> {
        let uri = format!("{}/v1/domains/{}", self.base_url, hostname);
        let request = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .header(header::ACCEPT, "application/json")
            .body(GatewayBody::empty())
            .map_err(|e| ControlError::Unavailable(e.to_string()))?;

        let response = tokio::time::timeout(RESOLVE_TIMEOUT, self.client.request(request))
            .await
            .map_err(|_| ControlError::Unavailable("resolve deadline exceeded".into()))?
            .map_err(|e| ControlError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = tokio::time::timeout(RESOLVE_TIMEOUT, response.into_body().collect())
                    .await
                    .map_err(|_| ControlError::Unavailable("resolve body deadline".into()))?
                    .map_err(|e| ControlError::Unavailable(e.to_string()))?
                    .to_bytes();
                // A descriptor that fails validation is indistinguishable
                // from a broken control plane for serving purposes.
                DeploymentDescriptor::from_wire(&body).map_err(|e| {
                    warn!(hostname, error = %e, "control plane returned invalid descriptor");
                    ControlError::Unavailable(format!("invalid descriptor: {e}"))
                })
            }
            StatusCode::NOT_FOUND => Err(ControlError::NotFound),
            status => Err(ControlError::Unavailable(format!(
                "control plane returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlClient {
    async fn resolve_domain(&self, hostname: &str) -> Result<DeploymentDescriptor, ControlError> {
        let mut backoff = BACKOFF_BASE;
        let mut attempt = 0;
        loop {
            match self.attempt(hostname).await {
                Ok(descriptor) => return Ok(descriptor),
                Err(ControlError::NotFound) => return Err(ControlError::NotFound),
                Err(ControlError::Unavailable(reason)) if attempt < RESOLVE_RETRIES => {
                    attempt += 1;
                    debug!(hostname, attempt, %reason, "retrying domain resolve");
                    tokio::time::sleep(backoff).await;
                    backoff *= 3;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
