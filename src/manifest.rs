//! Deployment descriptors and manifest parsing.
//!
//! The control plane resolves a hostname to a deployment descriptor whose
//! manifest maps request paths onto static blobs or runner functions. The
//! wire JSON is parsed into a discriminated union and validated up front;
//! a descriptor that fails validation is rejected at resolve time so that
//! request dispatch never sees a malformed manifest.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Wire format version this gateway understands.
pub const MANIFEST_VERSION: u32 = 1;

/// How a manifest resource is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// File served verbatim from the object store.
    Static,
    /// Reverse proxy to the function runner.
    Dynamic,
}

/// One row of a deployment manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResource {
    pub kind: ResourceKind,
    /// Request path pattern. Literal path for static resources, prefix
    /// for dynamic ones.
    pub url_path: String,
    /// Object-store key suffix (static) or function identifier (dynamic).
    pub resource_path: String,
    /// Per-resource response header overrides, applied last.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Ordered manifest as shipped by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub resources: Vec<ManifestResource>,
}

/// Resolved representation of one customer deployment.
///
/// Immutable once observed: the control plane never mutates a deployment
/// in place, it binds the hostname to a new `deploymentId` instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub deployment_id: String,
    pub project_id: String,
    pub manifest: Manifest,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

/// Manifest validation failure, reported at resolve time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
    #[error("resource {0}: urlPath must start with '/'")]
    BadUrlPath(usize),
    #[error("resource {0}: resourcePath is empty")]
    EmptyResourcePath(usize),
    #[error("deploymentId is empty")]
    EmptyDeploymentId,
}

impl DeploymentDescriptor {
    /// Parses and validates a control-plane response body.
    pub fn from_wire(body: &[u8]) -> Result<Self, anyhow::Error> {
        let descriptor: DeploymentDescriptor = serde_json::from_slice(body)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Validates the descriptor invariants the router relies on.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.deployment_id.is_empty() {
            return Err(ManifestError::EmptyDeploymentId);
        }
        if self.manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(self.manifest.version));
        }
        for (i, resource) in self.manifest.resources.iter().enumerate() {
            if !resource.url_path.starts_with('/') {
                return Err(ManifestError::BadUrlPath(i));
            }
            if resource.resource_path.is_empty() {
                return Err(ManifestError::EmptyResourcePath(i));
            }
        }
        Ok(())
    }

    /// The deployment's custom 404 page, if the manifest advertises one.
    pub fn custom_not_found(&self) -> Option<&ManifestResource> {
        self.manifest
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::Static && r.url_path == "/404.html")
    }
}
