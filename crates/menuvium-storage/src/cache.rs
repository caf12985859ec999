use futures::future::{BoxFuture, FutureExt, Shared};
use menuvium_core::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

type InFlight<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Short-lived memoization for list fetches, with in-flight de-duplication.
///
/// Clones share state. A caller that asks for a key while another caller's
/// fetch for it is still running awaits that fetch instead of starting one.
pub struct DashboardCache<T> {
    ttl: Duration,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for DashboardCache<T> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
}

struct Entry<T> {
    value: T,
    updated_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub from_cache: bool,
}

impl<T> DashboardCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Fresh value for `key`. An expired entry is dropped on the way out.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(e) => e.updated_at.elapsed() > self.ttl,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        self.inner.lock().entries.insert(
            key.into(),
            Entry {
                value,
                updated_at: Instant::now(),
            },
        );
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<Fetched<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!(key, "dashboard cache hit");
            return Ok(Fetched {
                value,
                from_cache: true,
            });
        }

        let pending = {
            let mut inner = self.inner.lock();
            match inner.in_flight.get(key) {
                Some(pending) => {
                    tracing::debug!(key, "joining in-flight fetch");
                    pending.clone()
                }
                None => {
                    let fut = fetcher();
                    let shared = Self::settle(self.inner.clone(), key.to_string(), fut)
                        .boxed()
                        .shared();
                    inner.in_flight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        let value = pending.await?;
        Ok(Fetched {
            value,
            from_cache: false,
        })
    }

    // Stores a successful result and always clears the in-flight slot.
    async fn settle<Fut>(inner: Arc<Mutex<Inner<T>>>, key: String, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let res = fut.await;
        let mut guard = inner.lock();
        guard.in_flight.remove(&key);
        match &res {
            Ok(value) => {
                guard.entries.insert(
                    key,
                    Entry {
                        value: value.clone(),
                        updated_at: Instant::now(),
                    },
                );
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "dashboard fetch failed"),
        }
        res
    }

    /// Drops every cached entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        before - inner.entries.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DashboardCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
