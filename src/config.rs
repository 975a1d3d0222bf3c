//! Gateway configuration.
//!
//! Options merge in three layers: built-in defaults, an optional YAML file,
//! and `ORIGAN_*` environment variables (nested fields use `__`, e.g.
//! `ORIGAN_BUCKET__NAME`). Configuration is loaded once at startup; the
//! running gateway never mutates it.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Object store (S3-compatible) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_bucket_name")]
    pub name: String,
    /// Endpoint URL, e.g. `http://minio:9000`.
    #[serde(default = "default_bucket_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_bucket_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: default_bucket_name(),
            endpoint: default_bucket_endpoint(),
            region: default_bucket_region(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

/// Top-level configuration for the Origan gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Plain HTTP listener port (ACME challenges, health, redirect).
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// TLS listener port.
    #[serde(default = "default_https_port")]
    pub https_port: u16,

    /// Redirect non-ACME plain-HTTP traffic to HTTPS with a 308.
    #[serde(default = "default_true")]
    pub redirect_to_https: bool,

    /// Optional fallback certificate chain for unknown-SNI handshakes.
    #[serde(default)]
    pub default_cert_path: Option<PathBuf>,

    /// Private key for the fallback certificate.
    #[serde(default)]
    pub default_key_path: Option<PathBuf>,

    /// Byte budget for the in-memory static artifact cache.
    #[serde(default = "default_artifact_cache_bytes")]
    pub artifact_cache_bytes: u64,

    /// Largest single artifact admitted to the cache; bigger files are
    /// streamed from the object store instead.
    #[serde(default = "default_artifact_max_entry_bytes")]
    pub artifact_max_entry_bytes: u64,

    /// TTL for positive hostname → deployment entries.
    #[serde(with = "humantime_serde", default = "default_config_ttl")]
    pub config_ttl: Duration,

    /// TTL for negative (unknown hostname) entries.
    #[serde(with = "humantime_serde", default = "default_negative_config_ttl")]
    pub negative_config_ttl: Duration,

    /// Maximum certificate cache TTL; capped at notAfter minus the
    /// safety margin.
    #[serde(with = "humantime_serde", default = "default_cert_cache_ttl")]
    pub cert_cache_ttl: Duration,

    /// TTL for negative certificate entries.
    #[serde(with = "humantime_serde", default = "default_cert_negative_ttl")]
    pub cert_negative_ttl: Duration,

    /// A cached certificate this close to notAfter is not served.
    #[serde(with = "humantime_serde", default = "default_cert_safety_margin")]
    pub cert_safety_margin: Duration,

    /// The sweeper eagerly refetches certificates expiring within this
    /// window.
    #[serde(with = "humantime_serde", default = "default_cert_refresh_window")]
    pub cert_refresh_window: Duration,

    /// TLS handshake deadline, including the SNI certificate fetch.
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,

    /// Function runner base URL, e.g. `http://runner:9000`.
    #[serde(default = "default_runner_base_url")]
    pub runner_base_url: String,

    /// Control plane base URL.
    #[serde(default = "default_control_base_url")]
    pub control_base_url: String,

    /// Time allowed for the runner to produce response headers.
    #[serde(with = "humantime_serde", default = "default_runner_headers_timeout")]
    pub runner_headers_timeout: Duration,

    #[serde(default)]
    pub bucket: BucketConfig,

    /// Total wall-time budget for a static request.
    #[serde(with = "humantime_serde", default = "default_request_timeout_static")]
    pub request_timeout_static: Duration,

    /// Total wall-time budget for a dynamic request, up to response
    /// headers.
    #[serde(with = "humantime_serde", default = "default_request_timeout_dynamic")]
    pub request_timeout_dynamic: Duration,

    /// Upper bound on concurrently accepted connections per listener.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        // Round-trips every field through its serde default.
        serde_json::from_str("{}").expect("defaults are total")
    }
}

impl GatewayConfig {
    /// Loads configuration: defaults, then the YAML file (if any), then
    /// `ORIGAN_*` environment variables.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use origan_gateway::config::GatewayConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = GatewayConfig::load(Some(Path::new("/etc/origan/gateway.yaml")))?;
    /// println!("listening on {} and {}", config.http_port, config.https_port);
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: GatewayConfig = figment
            .merge(Env::prefixed("ORIGAN_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Bind address for the plain HTTP listener.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.http_port)
    }

    /// Bind address for the TLS listener.
    pub fn https_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.https_port)
    }
}

fn default_http_port() -> u16 {
    7777
}

fn default_https_port() -> u16 {
    7778
}

fn default_true() -> bool {
    true
}

fn default_artifact_cache_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_artifact_max_entry_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_config_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_negative_config_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_cert_cache_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_cert_negative_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_cert_safety_margin() -> Duration {
    Duration::from_secs(3600)
}

fn default_cert_refresh_window() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_runner_headers_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_runner_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_control_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_static() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout_dynamic() -> Duration {
    Duration::from_secs(65)
}

fn default_max_connections() -> usize {
    4096
}

fn default_bucket_name() -> String {
    "origan".to_string()
}

fn default_bucket_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_bucket_region() -> String {
    "us-east-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
