//! Keyed request coalescing.
//!
//! Concurrent callers asking for the same key share one execution of the load
//! and all receive its outcome, success or error. The load runs on its own
//! task and removes its entry when it finishes, whether or not any caller is
//! still waiting, so an abandoned key never holds a stale flight.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Flight<V, E> {
    id: u64,
    load: SharedLoad<V, E>,
}

/// Coalesces concurrent loads per key.
pub struct SingleFlight<K, V, E> {
    inflight: Arc<Mutex<HashMap<K, Flight<V, E>>>>,
    next_id: AtomicU64,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `load` for `key`, or join the load already running for it.
    ///
    /// `load` is only invoked when no flight exists for `key`. Its future is
    /// spawned onto the current Tokio runtime, so it completes even if every
    /// caller is dropped. `abandoned` supplies the error returned when the
    /// load panics or its task is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the shared load.
    pub async fn run<F, Fut, A>(&self, key: K, load: F, abandoned: A) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        A: Fn() -> E + Send + Sync + 'static,
    {
        let mut inflight = self.inflight.lock().await;

        if let Some(flight) = inflight.get(&key) {
            let shared = flight.load.clone();
            drop(inflight);
            return shared.await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.inflight);
        let owned_key = key.clone();
        let abandoned = Arc::new(abandoned);
        let work = load();

        let task = {
            let abandoned = Arc::clone(&abandoned);
            tokio::spawn(async move {
                let result = AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err((*abandoned)()));
                let mut inflight = registry.lock().await;
                if inflight.get(&owned_key).is_some_and(|f| f.id == id) {
                    inflight.remove(&owned_key);
                }
                result
            })
        };

        let fut: BoxFuture<'static, Result<V, E>> =
            Box::pin(async move { task.await.unwrap_or_else(|_| Err((*abandoned)())) });

        let shared = fut.shared();
        inflight.insert(
            key,
            Flight {
                id,
                load: shared.clone(),
            },
        );
        drop(inflight);

        shared.await
    }

    /// Number of keys with a load in progress.
    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
