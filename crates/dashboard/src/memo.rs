//! Request memoization keyed by URL.
//!
//! Concurrent calls for the same key share one in-flight future, so only
//! one request reaches the server. The last successful value per key is
//! kept and can be read back with [`Memo::cached`]. Failures are handed to
//! every waiter but never stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt, Shared};

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Deduplicates identical in-flight requests and remembers their results.
pub struct Memo<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    state: Mutex<MemoState<T, E>>,
}

struct MemoState<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// In-flight fetches, tagged so a finished fetch only clears itself.
    in_flight: HashMap<String, (u64, SharedFetch<T, E>)>,
    last: HashMap<String, T>,
    next_tag: u64,
}

impl<T, E> Default for Memo<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoState {
                in_flight: HashMap::new(),
                last: HashMap::new(),
                next_tag: 0,
            }),
        }
    }
}

impl<T, E> Memo<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `key`, joining an in-flight fetch if there is one and
    /// starting `make()` otherwise.
    pub async fn fetch<F, Fut>(&self, key: &str, make: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tag, shared) = {
            let mut state = self.lock();
            match state.in_flight.get(key) {
                Some((tag, shared)) => {
                    tracing::debug!(key, "Joining in-flight request");
                    (*tag, shared.clone())
                }
                None => {
                    let tag = state.next_tag;
                    state.next_tag += 1;
                    let shared = make().boxed().shared();
                    state
                        .in_flight
                        .insert(key.to_string(), (tag, shared.clone()));
                    (tag, shared)
                }
            }
        };

        let result = shared.await;

        let mut state = self.lock();
        if state
            .in_flight
            .get(key)
            .is_some_and(|(current, _)| *current == tag)
        {
            state.in_flight.remove(key);
        }
        if let Ok(value) = &result {
            state.last.insert(key.to_string(), value.clone());
        }
        result
    }

    /// Last successful value for `key`, if any.
    pub fn cached(&self, key: &str) -> Option<T> {
        self.lock().last.get(key).cloned()
    }

    /// Number of keys with a fetch currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoState<T, E>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
