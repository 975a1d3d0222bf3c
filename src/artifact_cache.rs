//! Bounded-memory cache of fully buffered static artifacts.
//!
//! Keyed by `(deploymentId, resourcePath)`, which is content-addressed:
//! deployments are immutable, so entries never need invalidation and are
//! only evicted under memory pressure, least-recently-used first. Loads
//! are single-flight, so a thundering herd on one artifact produces one
//! blob fetch. The loader decides the entry's fate: buffer it, mark it
//! oversized (served by streaming, only its metadata is remembered), or
//! negative-cache a missing blob briefly to absorb 404 storms against
//! broken manifests.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::GatewayError;
use crate::singleflight::SingleFlight;

/// Cache key: a deployment's immutable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub deployment_id: String,
    pub resource_path: String,
}

/// A fully materialized static response body.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub bytes: Bytes,
    pub content_type: String,
    /// Strong etag: quoted hex SHA-256 of the content.
    pub etag: String,
    pub last_modified: SystemTime,
    /// Whether `bytes` is already gzip-compressed.
    pub gzipped: bool,
}

/// What a loader produced for a missing key.
pub enum ArtifactLoad {
    /// Admit this artifact to the cache.
    Buffer(CachedArtifact),
    /// Too large to buffer; remember the metadata, callers stream.
    Stream {
        content_length: Option<u64>,
        last_modified: Option<SystemTime>,
    },
}

/// How a `get` resolved.
#[derive(Clone, Debug)]
pub enum ArtifactOutcome {
    /// Serve from memory.
    Cached(Arc<CachedArtifact>),
    /// Open a fresh blob stream; the artifact exists but is not
    /// buffered.
    Stream {
        content_length: Option<u64>,
        last_modified: Option<SystemTime>,
    },
}

enum Slot {
    Found(Arc<CachedArtifact>),
    Oversized {
        content_length: Option<u64>,
        last_modified: Option<SystemTime>,
    },
    /// The store had no such object; replay the error until `until`.
    Missing { error: GatewayError, until: Instant },
}

struct Inner {
    entries: LruCache<ArtifactKey, Slot>,
    used: u64,
}

/// Byte-budgeted LRU over [`CachedArtifact`]s.
pub struct ArtifactCache {
    inner: Arc<Mutex<Inner>>,
    flight: SingleFlight<ArtifactKey, Result<ArtifactOutcome, GatewayError>>,
    budget: u64,
    max_entry: u64,
    negative_ttl: Duration,
}

impl ArtifactCache {
    pub fn new(budget: u64, max_entry: u64, negative_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used: 0,
            })),
            flight: SingleFlight::new(),
            budget,
            max_entry,
            negative_ttl,
        }
    }

    /// Per-entry admission cap in bytes.
    pub fn max_entry_bytes(&self) -> u64 {
        self.max_entry
    }

    /// Resolves an artifact, running `load` once across concurrent
    /// callers on miss.
    ///
    /// The loader performs the single blob fetch: metadata probe, and
    /// the full read when the object is small enough to buffer.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use origan_gateway::artifact_cache::{
    ///     ArtifactCache, ArtifactKey, ArtifactLoad, ArtifactOutcome,
    /// };
    ///
    /// # async fn example(
    /// #     cache: &ArtifactCache,
    /// #     load_from_store: impl Future<Output = Result<ArtifactLoad, origan_gateway::GatewayError>> + Send + 'static,
    /// # ) -> Result<(), origan_gateway::GatewayError> {
    /// let key = ArtifactKey {
    ///     deployment_id: "dep-1".to_string(),
    ///     resource_path: "app/index.html".to_string(),
    /// };
    /// match cache.get(key, || load_from_store).await? {
    ///     ArtifactOutcome::Cached(artifact) => println!("{} bytes buffered", artifact.bytes.len()),
    ///     ArtifactOutcome::Stream { content_length, .. } => {
    ///         println!("too large to buffer ({content_length:?}), stream it")
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<F, Fut>(
        &self,
        key: ArtifactKey,
        load: F,
    ) -> Result<ArtifactOutcome, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArtifactLoad, GatewayError>> + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            match inner.entries.get(&key) {
                Some(Slot::Found(artifact)) => {
                    return Ok(ArtifactOutcome::Cached(Arc::clone(artifact)));
                }
                Some(Slot::Oversized {
                    content_length,
                    last_modified,
                }) => {
                    return Ok(ArtifactOutcome::Stream {
                        content_length: *content_length,
                        last_modified: *last_modified,
                    });
                }
                Some(Slot::Missing { error, until }) => {
                    if Instant::now() < *until {
                        return Err(error.clone());
                    }
                    inner.entries.pop(&key);
                }
                None => {}
            }
        }

        let inner = Arc::clone(&self.inner);
        let flight_key = key.clone();
        let budget = self.budget;
        let max_entry = self.max_entry;
        let negative_ttl = self.negative_ttl;
        let fut = load();
        let outcome = self
            .flight
            .run(flight_key, move || async move {
                match fut.await {
                    Ok(ArtifactLoad::Buffer(artifact)) => {
                        Ok(install(&inner, key, artifact, budget, max_entry))
                    }
                    Ok(ArtifactLoad::Stream {
                        content_length,
                        last_modified,
                    }) => {
                        inner.lock().entries.put(
                            key,
                            Slot::Oversized {
                                content_length,
                                last_modified,
                            },
                        );
                        Ok(ArtifactOutcome::Stream {
                            content_length,
                            last_modified,
                        })
                    }
                    Err(error @ GatewayError::InternalManifestBroken(_)) => {
                        inner.lock().entries.put(
                            key,
                            Slot::Missing {
                                error: error.clone(),
                                until: Instant::now() + negative_ttl,
                            },
                        );
                        Err(error)
                    }
                    Err(error) => Err(error),
                }
            })
            .await;
        outcome.unwrap_or_else(|| Err(GatewayError::Internal("artifact load aborted".into())))
    }

    /// Current buffered byte total, excluding metadata-only slots.
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired negative entries. Called by the background sweeper.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<ArtifactKey> = inner
            .entries
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Missing { until, .. } if now >= *until => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in expired {
            inner.entries.pop(&key);
        }
    }
}

/// Installs a buffered artifact, evicting least-recently-used entries
/// until the byte budget holds. An artifact over the per-entry cap is
/// returned uncached.
fn install(
    inner: &Mutex<Inner>,
    key: ArtifactKey,
    artifact: CachedArtifact,
    budget: u64,
    max_entry: u64,
) -> ArtifactOutcome {
    let artifact = Arc::new(artifact);
    let size = artifact.bytes.len() as u64;
    if size > max_entry || size > budget {
        return ArtifactOutcome::Cached(artifact);
    }

    let mut inner = inner.lock();
    if let Some(Slot::Found(old)) = inner.entries.put(key, Slot::Found(Arc::clone(&artifact))) {
        inner.used -= old.bytes.len() as u64;
    }
    inner.used += size;
    while inner.used > budget {
        match inner.entries.pop_lru() {
            Some((evicted_key, Slot::Found(evicted))) => {
                inner.used -= evicted.bytes.len() as u64;
                debug!(
                    deployment_id = %evicted_key.deployment_id,
                    resource_path = %evicted_key.resource_path,
                    bytes = evicted.bytes.len(),
                    "evicted artifact"
                );
            }
            Some(_) => {}
            None => break,
        }
    }
    ArtifactOutcome::Cached(artifact)
}
