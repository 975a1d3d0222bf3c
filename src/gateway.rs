//! Gateway assembly.
//!
//! All process-wide state lives in one [`Gateway`] value: the caches, the
//! collaborator clients, and the configuration. Listeners share it behind
//! an `Arc`; tests build one with in-memory fakes. There are no module
//! globals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rustls::sign::CertifiedKey;

use crate::acme::AcmeChallenges;
use crate::artifact_cache::ArtifactCache;
use crate::blob::{ObjectStore, S3Store};
use crate::certs::{CertStore, load_fallback_certificate};
use crate::config::GatewayConfig;
use crate::config_cache::ConfigCache;
use crate::control::{ControlPlane, HttpControlClient};
use crate::proxy::RunnerProxy;
use crate::static_files::StaticFiles;

/// TTL for negative artifact entries (missing blobs named by a
/// manifest).
const ARTIFACT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// The edge gateway: owns every cache and client on the request path.
pub struct Gateway {
    config: GatewayConfig,
    config_cache: ConfigCache,
    cert_store: CertStore,
    artifact_cache: Arc<ArtifactCache>,
    pub(crate) static_files: StaticFiles,
    pub(crate) proxy: RunnerProxy,
    pub(crate) acme: AcmeChallenges,
}

impl Gateway {
    /// Assembles a gateway around explicit collaborators. Tests inject
    /// fakes here; production goes through [`Gateway::from_config`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use origan_gateway::Gateway;
    /// use origan_gateway::blob::MemoryStore;
    /// use origan_gateway::config::GatewayConfig;
    /// use origan_gateway::control::ControlPlane;
    ///
    /// # fn example(control: Arc<dyn ControlPlane>) {
    /// let store = Arc::new(MemoryStore::new());
    /// store.put("acme-challenges/abc123", "abc123.key-auth".as_bytes().to_vec());
    /// let gateway = Gateway::new(GatewayConfig::default(), store, control, None);
    /// # let _ = gateway;
    /// # }
    /// ```
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn ObjectStore>,
        control: Arc<dyn ControlPlane>,
        fallback_cert: Option<Arc<CertifiedKey>>,
    ) -> Self {
        let artifact_cache = Arc::new(ArtifactCache::new(
            config.artifact_cache_bytes,
            config.artifact_max_entry_bytes,
            ARTIFACT_NEGATIVE_TTL,
        ));
        let config_cache = ConfigCache::new(control, config.config_ttl, config.negative_config_ttl);
        let cert_store = CertStore::new(
            Arc::clone(&store),
            config.cert_cache_ttl,
            config.cert_negative_ttl,
            config.cert_safety_margin,
            config.cert_refresh_window,
            fallback_cert,
        );
        let static_files = StaticFiles::new(Arc::clone(&store), Arc::clone(&artifact_cache));
        let proxy = RunnerProxy::new(&config.runner_base_url, config.runner_headers_timeout);
        let acme = AcmeChallenges::new(Arc::clone(&store));
        Self {
            config,
            config_cache,
            cert_store,
            artifact_cache,
            static_files,
            proxy,
            acme,
        }
    }

    /// Builds the production gateway: S3 object store, HTTP control
    /// client, and the optional fallback certificate from disk.
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config.bucket));
        let control: Arc<dyn ControlPlane> =
            Arc::new(HttpControlClient::new(&config.control_base_url));
        let fallback_cert = match (&config.default_cert_path, &config.default_key_path) {
            (Some(cert_path), Some(key_path)) => Some(
                load_fallback_certificate(cert_path, key_path)
                    .with_context(|| format!("loading {}", cert_path.display()))?,
            ),
            (None, None) => None,
            _ => anyhow::bail!("default_cert_path and default_key_path must be set together"),
        };
        Ok(Self::new(config, store, control, fallback_cert))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn config_cache(&self) -> &ConfigCache {
        &self.config_cache
    }

    /// The certificate cache, consulted by the TLS listener's SNI path.
    pub fn cert_store(&self) -> &CertStore {
        &self.cert_store
    }

    pub fn artifact_cache(&self) -> &ArtifactCache {
        &self.artifact_cache
    }

    /// One sweeper pass: expired cache entries out, expiring
    /// certificates refreshed.
    pub async fn sweep(&self) {
        self.config_cache.sweep();
        self.artifact_cache.sweep();
        self.cert_store.sweep().await;
    }
}
