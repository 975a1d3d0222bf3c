//! Hostname → deployment descriptor cache.
//!
//! Sits between the request pipeline and the control plane. Entries are
//! TTL'd (positive and negative separately) and refreshed single-flight:
//! any number of first-touch requests for one hostname produce one
//! control-plane call. A refresh that fails transiently does not poison
//! the cache; the previous entry, even expired, keeps serving for a
//! bounded stale window so brief control-plane outages stay invisible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::control::{ControlError, ControlPlane};
use crate::error::GatewayError;
use crate::manifest::DeploymentDescriptor;
use crate::singleflight::SingleFlight;

/// Stale entries are eligible as fallback for this many positive TTLs.
const STALE_WINDOW_FACTOR: u32 = 10;

#[derive(Clone)]
struct ConfigEntry {
    /// `None` is a negative entry: the control plane said NotFound.
    descriptor: Option<Arc<DeploymentDescriptor>>,
    expires_at: Instant,
    stored_at: Instant,
}

type ResolveOutcome = Result<Option<Arc<DeploymentDescriptor>>, GatewayError>;

/// TTL'd, single-flight cache of domain resolutions.
pub struct ConfigCache {
    control: Arc<dyn ControlPlane>,
    entries: Arc<Mutex<HashMap<String, ConfigEntry>>>,
    flight: SingleFlight<String, ResolveOutcome>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl ConfigCache {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            control,
            entries: Arc::new(Mutex::new(HashMap::new())),
            flight: SingleFlight::new(),
            positive_ttl,
            negative_ttl,
        }
    }

    /// Resolves a normalized hostname to its deployment descriptor.
    ///
    /// `Err(NotFoundDomain)` is an authoritative miss (cacheable);
    /// `Err(Unavailable)` means neither the control plane nor a stale
    /// entry could answer.
    pub async fn resolve(&self, hostname: &str) -> Result<Arc<DeploymentDescriptor>, GatewayError> {
        let now = Instant::now();
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(hostname) {
                if now < entry.expires_at {
                    return match &entry.descriptor {
                        Some(descriptor) => Ok(Arc::clone(descriptor)),
                        None => Err(GatewayError::NotFoundDomain),
                    };
                }
            }
        }

        let outcome = self
            .flight
            .run(hostname.to_string(), {
                let control = Arc::clone(&self.control);
                let entries = Arc::clone(&self.entries);
                let hostname = hostname.to_string();
                let positive_ttl = self.positive_ttl;
                let negative_ttl = self.negative_ttl;
                move || async move {
                    match control.resolve_domain(&hostname).await {
                        Ok(descriptor) => {
                            let descriptor = Arc::new(descriptor);
                            let now = Instant::now();
                            entries.lock().insert(
                                hostname,
                                ConfigEntry {
                                    descriptor: Some(Arc::clone(&descriptor)),
                                    expires_at: now + positive_ttl,
                                    stored_at: now,
                                },
                            );
                            Ok(Some(descriptor))
                        }
                        Err(ControlError::NotFound) => {
                            let now = Instant::now();
                            entries.lock().insert(
                                hostname,
                                ConfigEntry {
                                    descriptor: None,
                                    expires_at: now + negative_ttl,
                                    stored_at: now,
                                },
                            );
                            Ok(None)
                        }
                        Err(ControlError::Unavailable(reason)) => {
                            // Leave any prior entry in place; callers may
                            // fall back to it.
                            Err(GatewayError::Unavailable(reason))
                        }
                    }
                }
            })
            .await
            .unwrap_or_else(|| Err(GatewayError::Internal("domain resolve aborted".into())));

        match outcome {
            Ok(Some(descriptor)) => Ok(descriptor),
            Ok(None) => Err(GatewayError::NotFoundDomain),
            Err(error @ GatewayError::Unavailable(_)) => {
                if let Some(stale) = self.stale_fallback(hostname) {
                    warn!(hostname, "control plane unavailable, serving stale deployment");
                    return Ok(stale);
                }
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// An expired positive entry still within the stale window.
    fn stale_fallback(&self, hostname: &str) -> Option<Arc<DeploymentDescriptor>> {
        let entries = self.entries.lock();
        let entry = entries.get(hostname)?;
        let descriptor = entry.descriptor.as_ref()?;
        if entry.stored_at.elapsed() <= self.positive_ttl * STALE_WINDOW_FACTOR {
            Some(Arc::clone(descriptor))
        } else {
            None
        }
    }

    /// Drops entries past any possible use: negatives past TTL, positives
    /// past the stale window. Called by the background sweeper.
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale_window = self.positive_ttl * STALE_WINDOW_FACTOR;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| match entry.descriptor {
            Some(_) => now.duration_since(entry.stored_at) <= stale_window,
            None => now < entry.expires_at,
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, "swept domain config entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::manifest::Manifest;

    struct ScriptedControl {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<DeploymentDescriptor, ControlError>>>,
    }

    impl ScriptedControl {
        fn new(responses: Vec<Result<DeploymentDescriptor, ControlError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ControlPlane for ScriptedControl {
        async fn resolve_domain(
            &self,
            _hostname: &str,
        ) -> Result<DeploymentDescriptor, ControlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].as_ref().map(Clone::clone).map_err(|e| match e {
                    ControlError::NotFound => ControlError::NotFound,
                    ControlError::Unavailable(r) => ControlError::Unavailable(r.clone()),
                })
            }
        }
    }

    fn descriptor(id: &str) -> DeploymentDescriptor {
        DeploymentDescriptor {
            deployment_id: id.to_string(),
            project_id: "proj".to_string(),
            manifest: Manifest {
                version: 1,
                resources: Vec::new(),
            },
            env_vars: Default::default(),
        }
    }

    #[tokio::test]
    async fn positive_entry_is_cached() {
        let control = ScriptedControl::new(vec![Ok(descriptor("dep-1"))]);
        let cache = ConfigCache::new(
            control.clone(),
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        for _ in 0..3 {
            let d = cache.resolve("foo.app.example").await.unwrap();
            assert_eq!(d.deployment_id, "dep-1");
        }
        assert_eq!(control.calls(), 1);
    }

    #[tokio::test]
    async fn negative_entry_absorbs_repeat_lookups() {
        let control = ScriptedControl::new(vec![Err(ControlError::NotFound)]);
        let cache = ConfigCache::new(
            control.clone(),
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        for _ in 0..3 {
            let err = cache.resolve("unknown.example").await.unwrap_err();
            assert_eq!(err, GatewayError::NotFoundDomain);
        }
        assert_eq!(control.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_touch_storm_resolves_once() {
        let control = ScriptedControl::new(vec![Ok(descriptor("dep-1"))]);
        let cache = Arc::new(ConfigCache::new(
            control.clone(),
            Duration::from_secs(300),
            Duration::from_secs(30),
        ));
        let mut handles = Vec::new();
        for _ in 0..12 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.resolve("foo.app.example").await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(control.calls(), 1);
    }

    #[tokio::test]
    async fn stale_entry_survives_control_outage() {
        let control = ScriptedControl::new(vec![
            Ok(descriptor("dep-1")),
            Err(ControlError::Unavailable("down".into())),
        ]);
        // Short TTL so the first entry expires quickly but stays well
        // inside the 10x stale window.
        let cache = ConfigCache::new(
            control.clone(),
            Duration::from_millis(50),
            Duration::from_secs(30),
        );
        cache.resolve("foo.app.example").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let d = cache.resolve("foo.app.example").await.unwrap();
        assert_eq!(d.deployment_id, "dep-1");
        assert_eq!(control.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_without_prior_entry_propagates() {
        let control = ScriptedControl::new(vec![Err(ControlError::Unavailable("down".into()))]);
        let cache = ConfigCache::new(
            control.clone(),
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        let err = cache.resolve("foo.app.example").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        // No entry was installed; the next call hits the control plane.
        let _ = cache.resolve("foo.app.example").await;
        assert_eq!(control.calls(), 2);
    }
}
