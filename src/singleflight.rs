//! Per-key call coalescing.
//!
//! `SingleFlight` guarantees at most one concurrent loader per key: the
//! first caller becomes the leader and spawns the load, later callers
//! subscribe to the same result. The load runs on a detached task, so a
//! waiter (or the leader) being cancelled never cancels the load itself,
//! and remaining subscribers still get the value.
//!
//! Used by the artifact, config, and certificate caches; the loaded value
//! must be `Clone` (in practice an `Arc` or a cloneable error).

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Coalesces concurrent loads of the same key.
pub struct SingleFlight<K, V> {
    inflight: Arc<Mutex<HashMap<K, watch::Receiver<Option<V>>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `load` for `key`, or joins an in-flight load of the same key.
    ///
    /// The lock is held only to register or discover the in-flight entry,
    /// never across the load itself. Returns `None` only if the loader
    /// task died without producing a value.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use origan_gateway::singleflight::SingleFlight;
    ///
    /// # async fn example() {
    /// let flight: SingleFlight<String, u32> = SingleFlight::new();
    /// // Concurrent callers with the same key share this one load.
    /// let value = flight.run("answer".to_string(), || async { 42 }).await;
    /// assert_eq!(value, Some(42));
    /// # }
    /// ```
    pub async fn run<F, Fut>(&self, key: K, load: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let mut rx = {
            let mut inflight = self.inflight.lock();
            if let Some(rx) = inflight.get(&key) {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), rx.clone());
                let fut = load();
                let inflight = Arc::clone(&self.inflight);
                tokio::spawn(async move {
                    let value = fut.await;
                    // Deregister before publishing: a caller arriving
                    // after the send must start a fresh load rather than
                    // observe a completed one.
                    inflight.lock().remove(&key);
                    let _ = tx.send(Some(value));
                });
                rx
            }
        };

        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return Some(value);
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Number of in-flight loads, for observability.
    pub fn len(&self) -> usize {
        self.inflight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_run_one_load() {
        let flight = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("key".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn distinct_keys_load_independently() {
        let flight = SingleFlight::<u32, u32>::new();
        let a = flight.run(1, || async { 10 });
        let b = flight.run(2, || async { 20 });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, Some(10));
        assert_eq!(b, Some(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_survives_caller_cancellation() {
        let flight = Arc::new(SingleFlight::<u32, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                flight
                    .run(7, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        99
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        // A second caller joins the still-running load; no second call.
        let value = flight
            .run(7, || async {
                unreachable!("load must be coalesced with the in-flight one")
            })
            .await;
        assert_eq!(value, Some(99));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
