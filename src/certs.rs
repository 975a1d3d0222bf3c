//! Certificate cache and SNI resolution.
//!
//! TLS material lives in the object store under `certs/<hostname>/chain`
//! and `certs/<hostname>/key`. The HTTPS listener asks this cache for a
//! certificate during the handshake; lookups are TTL'd, negative-cached,
//! and fetched single-flight so a handshake storm on a cold hostname
//! costs one pair of object reads.
//!
//! A cached certificate is never served past `notAfter` minus a safety
//! margin, and the background sweeper refetches material that enters the
//! refresh window, so renewals published to the store are picked up
//! before expiry without any signal from the control plane.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::blob::{BlobError, ObjectStore, cert_chain_key, cert_private_key_key};
use crate::error::GatewayError;
use crate::singleflight::SingleFlight;

/// Certificate load failure. `Clone` so single-flight waiters share it.
#[derive(Debug, Error, Clone)]
pub enum CertError {
    #[error("no certificate on record")]
    NotFound,
    #[error("invalid certificate material: {0}")]
    Invalid(String),
    #[error("certificate fetch failed: {0}")]
    Transient(String),
}

/// Parsed TLS material for one hostname.
#[derive(Clone)]
pub struct ParsedCertificate {
    pub key: Arc<CertifiedKey>,
    pub not_after: SystemTime,
}

enum CertSlot {
    Found {
        certificate: ParsedCertificate,
        expires_at: Instant,
    },
    Missing {
        until: Instant,
    },
}

/// Hostname → certificate cache backed by the object store.
pub struct CertStore {
    store: Arc<dyn ObjectStore>,
    entries: Arc<Mutex<HashMap<String, CertSlot>>>,
    flight: SingleFlight<String, Result<ParsedCertificate, CertError>>,
    ttl: Duration,
    negative_ttl: Duration,
    safety_margin: Duration,
    refresh_window: Duration,
    fallback: Option<Arc<CertifiedKey>>,
}

impl CertStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ttl: Duration,
        negative_ttl: Duration,
        safety_margin: Duration,
        refresh_window: Duration,
        fallback: Option<Arc<CertifiedKey>>,
    ) -> Self {
        Self {
            store,
            entries: Arc::new(Mutex::new(HashMap::new())),
            flight: SingleFlight::new(),
            ttl,
            negative_ttl,
            safety_margin,
            refresh_window,
            fallback,
        }
    }

    /// Resolves the certificate to present for an SNI hostname.
    ///
    /// `Err(NotFoundCert)` fails the handshake; when a fallback
    /// certificate is configured it stands in for unknown hostnames so
    /// the HTTP layer can explain the misconfiguration instead.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use origan_gateway::certs::CertStore;
    ///
    /// # async fn example(certs: &CertStore) -> Result<(), Box<dyn std::error::Error>> {
    /// // Inside the TLS accept path, after reading the ClientHello.
    /// let certified = certs.resolve("foo.app.example").await?;
    /// let config = origan_gateway::certs::server_config(certified);
    /// // Complete the handshake with `config`.
    /// # Ok(())
    /// # }
    /// ```
    pub async fn resolve(&self, sni: &str) -> Result<Arc<CertifiedKey>, GatewayError> {
        let Some(hostname) = crate::host::normalize_hostname(sni) else {
            return Err(GatewayError::NotFoundCert);
        };

        let now = Instant::now();
        {
            let entries = self.entries.lock();
            match entries.get(&hostname) {
                Some(CertSlot::Found {
                    certificate,
                    expires_at,
                }) if now < *expires_at && self.usable(certificate) => {
                    return Ok(Arc::clone(&certificate.key));
                }
                Some(CertSlot::Missing { until }) if now < *until => {
                    return self.not_found(&hostname);
                }
                _ => {}
            }
        }

        match self.fetch(&hostname).await {
            Ok(certificate) => {
                // Expired material on record is as good as none.
                if certificate.not_after <= SystemTime::now() {
                    warn!(hostname, "stored certificate is past notAfter");
                    return self.not_found(&hostname);
                }
                Ok(certificate.key)
            }
            Err(CertError::NotFound) | Err(CertError::Invalid(_)) => self.not_found(&hostname),
            Err(CertError::Transient(reason)) => Err(GatewayError::Unavailable(reason)),
        }
    }

    fn not_found(&self, hostname: &str) -> Result<Arc<CertifiedKey>, GatewayError> {
        match &self.fallback {
            Some(fallback) => {
                debug!(hostname, "serving fallback certificate");
                Ok(Arc::clone(fallback))
            }
            None => Err(GatewayError::NotFoundCert),
        }
    }

    fn usable(&self, certificate: &ParsedCertificate) -> bool {
        SystemTime::now() + self.safety_margin < certificate.not_after
    }

    /// Single-flight fetch and cache install, bypassing freshness checks.
    async fn fetch(&self, hostname: &str) -> Result<ParsedCertificate, CertError> {
        let store = Arc::clone(&self.store);
        let entries = Arc::clone(&self.entries);
        let owned = hostname.to_string();
        let ttl = self.ttl;
        let negative_ttl = self.negative_ttl;
        let safety_margin = self.safety_margin;
        self.flight
            .run(hostname.to_string(), move || async move {
                let outcome = load_certificate(store.as_ref(), &owned).await;
                let now = Instant::now();
                match &outcome {
                    Ok(certificate) => {
                        // Cap the TTL so the entry expires before the
                        // certificate stops being servable.
                        let servable = certificate
                            .not_after
                            .duration_since(SystemTime::now() + safety_margin)
                            .unwrap_or(Duration::ZERO);
                        entries.lock().insert(
                            owned,
                            CertSlot::Found {
                                certificate: certificate.clone(),
                                expires_at: now + ttl.min(servable),
                            },
                        );
                    }
                    Err(CertError::NotFound) | Err(CertError::Invalid(_)) => {
                        entries.lock().insert(
                            owned,
                            CertSlot::Missing {
                                until: now + negative_ttl,
                            },
                        );
                    }
                    Err(CertError::Transient(_)) => {}
                }
                outcome
            })
            .await
            .unwrap_or_else(|| Err(CertError::Transient("certificate load aborted".into())))
    }

    /// Sweeper hook: drops expired negatives and refetches certificates
    /// entering the refresh window.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let deadline = SystemTime::now() + self.refresh_window;
        let mut refresh = Vec::new();
        {
            let mut entries = self.entries.lock();
            entries.retain(|hostname, slot| match slot {
                CertSlot::Missing { until } => now < *until,
                CertSlot::Found { certificate, .. } => {
                    if certificate.not_after < deadline {
                        refresh.push(hostname.clone());
                    }
                    true
                }
            });
        }
        for hostname in refresh {
            info!(hostname, "refreshing certificate nearing expiry");
            if let Err(err) = self.fetch(&hostname).await {
                warn!(hostname, error = %err, "certificate refresh failed");
            }
        }
    }

    /// The configured fallback certificate, used when the client sent no
    /// SNI at all.
    pub fn fallback(&self) -> Option<Arc<CertifiedKey>> {
        self.fallback.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads and parses one hostname's TLS material from the object store.
async fn load_certificate(
    store: &dyn ObjectStore,
    hostname: &str,
) -> Result<ParsedCertificate, CertError> {
    let chain_key = cert_chain_key(hostname);
    let private_key_key = cert_private_key_key(hostname);
    let (chain, key) = tokio::join!(
        fetch_blob(store, &chain_key),
        fetch_blob(store, &private_key_key),
    );
    parse_certificate(&chain?, &key?)
}

async fn fetch_blob(store: &dyn ObjectStore, key: &str) -> Result<bytes::Bytes, CertError> {
    let object = store.get(key).await.map_err(|e| match e {
        BlobError::NotFound => CertError::NotFound,
        BlobError::Transient(reason) => CertError::Transient(reason),
    })?;
    object.collect().await.map_err(|e| match e {
        BlobError::NotFound => CertError::NotFound,
        BlobError::Transient(reason) => CertError::Transient(reason),
    })
}

/// Parses a PEM chain and private key into a signing-ready certificate.
pub fn parse_certificate(chain_pem: &[u8], key_pem: &[u8]) -> Result<ParsedCertificate, CertError> {
    let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &chain_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| CertError::Invalid(format!("bad certificate chain: {e}")))?;
    if chain.is_empty() {
        return Err(CertError::Invalid("certificate chain is empty".into()));
    }

    let key_der: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| CertError::Invalid(format!("bad private key: {e}")))?
        .ok_or_else(|| CertError::Invalid("no private key found".into()))?;
    let signing_key = any_supported_type(&key_der)
        .map_err(|e| CertError::Invalid(format!("unsupported private key: {e}")))?;

    let not_after = leaf_not_after(&chain[0])?;
    Ok(ParsedCertificate {
        key: Arc::new(CertifiedKey::new(chain, signing_key)),
        not_after,
    })
}

/// Extracts `notAfter` from the leaf certificate.
fn leaf_not_after(leaf: &CertificateDer<'_>) -> Result<SystemTime, CertError> {
    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
        .map_err(|e| CertError::Invalid(format!("unparsable leaf certificate: {e}")))?;
    let timestamp = cert.validity().not_after.timestamp();
    let timestamp =
        u64::try_from(timestamp).map_err(|_| CertError::Invalid("notAfter before epoch".into()))?;
    Ok(UNIX_EPOCH + Duration::from_secs(timestamp))
}

/// Loads the optional fallback certificate pair from disk.
pub fn load_fallback_certificate(
    cert_path: &std::path::Path,
    key_path: &std::path::Path,
) -> anyhow::Result<Arc<CertifiedKey>> {
    let chain_pem = std::fs::read(cert_path)?;
    let key_pem = std::fs::read(key_path)?;
    let parsed = parse_certificate(&chain_pem, &key_pem)
        .map_err(|e| anyhow::anyhow!("fallback certificate: {e}"))?;
    Ok(parsed.key)
}

/// Per-connection resolver handing rustls the already-chosen certificate.
#[derive(Debug)]
struct PresetCertificate(Arc<CertifiedKey>);

impl ResolvesServerCert for PresetCertificate {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

/// Builds the per-connection TLS configuration around a resolved
/// certificate. ALPN prefers HTTP/2.
pub fn server_config(key: Arc<CertifiedKey>) -> Arc<ServerConfig> {
    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(PresetCertificate(key)));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryStore;

    fn self_signed(host: &str) -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    fn self_signed_expiring(host: &str, days: i64) -> (String, String) {
        let mut params = rcgen::CertificateParams::new(vec![host.to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.pem(), key_pair.serialize_pem())
    }

    fn seeded_store(host: &str) -> Arc<MemoryStore> {
        let (chain, key) = self_signed(host);
        let store = Arc::new(MemoryStore::new());
        store.put(cert_chain_key(host), chain.into_bytes());
        store.put(cert_private_key_key(host), key.into_bytes());
        store
    }

    fn cert_store(store: Arc<MemoryStore>, fallback: Option<Arc<CertifiedKey>>) -> CertStore {
        CertStore::new(
            store,
            Duration::from_secs(3600),
            Duration::from_secs(60),
            Duration::from_secs(60),
            Duration::from_secs(7 * 24 * 3600),
            fallback,
        )
    }

    #[test]
    fn parses_self_signed_pair() {
        let (chain, key) = self_signed("foo.app.example");
        let parsed = parse_certificate(chain.as_bytes(), key.as_bytes()).unwrap();
        assert!(parsed.not_after > SystemTime::now());
    }

    #[tokio::test]
    async fn resolves_and_caches_by_hostname() {
        let store = seeded_store("foo.app.example");
        let certs = cert_store(Arc::clone(&store), None);

        certs.resolve("foo.app.example").await.unwrap();
        // Mixed case and trailing dot hit the same entry.
        certs.resolve("Foo.App.Example.").await.unwrap();
        assert_eq!(store.get_count(), 2, "one chain read and one key read");
    }

    #[tokio::test]
    async fn unknown_hostname_fails_handshake_and_negative_caches() {
        let store = Arc::new(MemoryStore::new());
        let certs = cert_store(Arc::clone(&store), None);

        for _ in 0..3 {
            let err = certs.resolve("unknown.example").await.unwrap_err();
            assert_eq!(err, GatewayError::NotFoundCert);
        }
        // First miss fetches chain and key; the rest hit the negative
        // entry.
        assert_eq!(store.get_count(), 2);
    }

    #[tokio::test]
    async fn fallback_covers_unknown_hostnames() {
        let (chain, key) = self_signed("*.app.example");
        let fallback = parse_certificate(chain.as_bytes(), key.as_bytes()).unwrap().key;
        let store = Arc::new(MemoryStore::new());
        let certs = cert_store(store, Some(Arc::clone(&fallback)));

        let resolved = certs.resolve("unknown.example").await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &fallback));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handshake_storm_fetches_once() {
        let store = seeded_store("foo.app.example");
        let certs = Arc::new(cert_store(Arc::clone(&store), None));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let certs = Arc::clone(&certs);
            handles.push(tokio::spawn(
                async move { certs.resolve("foo.app.example").await },
            ));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(store.get_count(), 2);
    }

    #[tokio::test]
    async fn sweep_refetches_expiring_certificates() {
        let (chain, key) = self_signed_expiring("foo.app.example", 3);
        let store = Arc::new(MemoryStore::new());
        store.put(cert_chain_key("foo.app.example"), chain.into_bytes());
        store.put(cert_private_key_key("foo.app.example"), key.into_bytes());
        // A cert three days from expiry sits inside the 7 d window.
        let certs = cert_store(Arc::clone(&store), None);

        certs.resolve("foo.app.example").await.unwrap();
        assert_eq!(store.get_count(), 2);
        certs.sweep().await;
        assert_eq!(store.get_count(), 4, "sweep refetched the pair");
    }

    #[tokio::test]
    async fn expired_material_fails_the_handshake() {
        let (chain, key) = self_signed_expiring("foo.app.example", -1);
        let store = Arc::new(MemoryStore::new());
        store.put(cert_chain_key("foo.app.example"), chain.into_bytes());
        store.put(cert_private_key_key("foo.app.example"), key.into_bytes());
        let certs = cert_store(store, None);

        let err = certs.resolve("foo.app.example").await.unwrap_err();
        assert_eq!(err, GatewayError::NotFoundCert);
    }
}
