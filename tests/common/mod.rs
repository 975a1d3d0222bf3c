//! Shared test support: in-memory collaborators and request helpers.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use origan_gateway::Gateway;
use origan_gateway::blob::MemoryStore;
use origan_gateway::config::GatewayConfig;
use origan_gateway::control::{ControlError, ControlPlane};
use origan_gateway::manifest::{DeploymentDescriptor, Manifest, ManifestResource, ResourceKind};
use origan_gateway::types::Response;

pub const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

/// Control plane fake: a fixed domain → deployment table.
pub struct FakeControl {
    domains: HashMap<String, DeploymentDescriptor>,
    calls: AtomicUsize,
    unavailable: bool,
}

impl FakeControl {
    pub fn new() -> Self {
        Self {
            domains: HashMap::new(),
            calls: AtomicUsize::new(0),
            unavailable: false,
        }
    }

    pub fn bind(mut self, hostname: &str, descriptor: DeploymentDescriptor) -> Self {
        self.domains.insert(hostname.to_string(), descriptor);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            domains: HashMap::new(),
            calls: AtomicUsize::new(0),
            unavailable: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for FakeControl {
    async fn resolve_domain(&self, hostname: &str) -> Result<DeploymentDescriptor, ControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(ControlError::Unavailable("control plane down".into()));
        }
        self.domains.get(hostname).cloned().ok_or(ControlError::NotFound)
    }
}

pub fn static_resource(url_path: &str, resource_path: &str) -> ManifestResource {
    ManifestResource {
        kind: ResourceKind::Static,
        url_path: url_path.to_string(),
        resource_path: resource_path.to_string(),
        headers: BTreeMap::new(),
    }
}

pub fn dynamic_resource(url_path: &str, function_ref: &str) -> ManifestResource {
    ManifestResource {
        kind: ResourceKind::Dynamic,
        url_path: url_path.to_string(),
        resource_path: function_ref.to_string(),
        headers: BTreeMap::new(),
    }
}

pub fn descriptor(deployment_id: &str, resources: Vec<ManifestResource>) -> DeploymentDescriptor {
    DeploymentDescriptor {
        deployment_id: deployment_id.to_string(),
        project_id: format!("{deployment_id}-project"),
        manifest: Manifest {
            version: 1,
            resources,
        },
        env_vars: BTreeMap::new(),
    }
}

/// Gateway wired to in-memory collaborators.
pub fn gateway(
    config: GatewayConfig,
    store: Arc<MemoryStore>,
    control: Arc<FakeControl>,
) -> Arc<Gateway> {
    Arc::new(Gateway::new(config, store, control, None))
}

/// Stores a deployment's static asset under its canonical key.
pub fn put_asset(store: &MemoryStore, deployment_id: &str, resource_path: &str, body: &[u8]) {
    store.put(
        format!("deployments/{deployment_id}/static/{resource_path}"),
        body.to_vec(),
    );
}

pub fn request(method: &str, uri: &str, host: &str) -> hyper::Request<Full<Bytes>> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::HOST, host)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn request_with_body(
    method: &str,
    uri: &str,
    host: &str,
    body: &[u8],
) -> hyper::Request<Full<Bytes>> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::HOST, host)
        .header(http::header::CONTENT_LENGTH, body.len())
        .body(Full::new(Bytes::copy_from_slice(body)))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collect response body")
        .to_bytes()
}
