use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::SsrError;
use crate::render::suspend::{Signal, Subscription};

/// Lifetime of a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Shared by every request for the lifetime of the process.
    Process,
    /// Owned by one response and serialized into it when the stream ends.
    PerRequest,
    /// Created for a single render and dropped with it; values reach the
    /// client through streamed sync instructions only.
    Render,
}

/// Handle to a production that has not finished yet.
#[derive(Debug, Clone)]
pub struct InFlight {
    signal: Signal,
    started_at: Instant,
}

impl InFlight {
    fn new() -> Self {
        Self { signal: Signal::new(), started_at: Instant::now() }
    }

    pub fn subscribe(&self) -> Subscription {
        self.signal.subscribe()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

#[derive(Debug, Clone)]
pub enum CacheEntry {
    Pending(InFlight),
    Fulfilled(String),
}

impl CacheEntry {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Pending(_) => None,
        }
    }
}

pub struct DataCache {
    scope: CacheScope,
    entries: Mutex<FxHashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("scope", &self.scope)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl DataCache {
    pub fn new(scope: CacheScope) -> Self {
        Self { scope, entries: Mutex::new(FxHashMap::default()) }
    }

    pub fn shared(scope: CacheScope) -> Arc<Self> {
        Arc::new(Self::new(scope))
    }

    pub fn scope(&self) -> CacheScope {
        self.scope
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Like [`DataCache::get`], but a key nobody started producing is a usage error.
    pub fn read(&self, key: &str) -> Result<CacheEntry, SsrError> {
        self.get(key).ok_or_else(|| {
            SsrError::validation(format!(
                "cache key '{key}' was read before any production was registered"
            ))
            .with_property("key", key)
        })
    }

    /// Registers `producer` for `key` unless an entry already exists.
    ///
    /// At most one production runs per key: a pending or fulfilled entry is
    /// returned as-is and `producer` is dropped without being polled.
    pub fn begin_pending<F>(self: &Arc<Self>, key: &str, producer: F) -> CacheEntry
    where
        F: Future<Output = String> + Send + 'static,
    {
        let in_flight = {
            let mut entries = self.entries.lock();
            if let Some(existing) = entries.get(key) {
                return existing.clone();
            }

            let in_flight = InFlight::new();
            entries.insert(key.to_string(), CacheEntry::Pending(in_flight.clone()));
            in_flight
        };

        debug!(key, scope = ?self.scope, "Production started");

        let cache = Arc::clone(self);
        let owned_key = key.to_string();
        tokio::spawn(async move {
            let value = producer.await;
            cache.resolve(&owned_key, value);
        });

        CacheEntry::Pending(in_flight)
    }

    /// Stores `value` as fulfilled and wakes everything suspended on the key.
    pub fn resolve(&self, key: &str, value: impl Into<String>) {
        let previous = {
            let mut entries = self.entries.lock();
            entries.insert(key.to_string(), CacheEntry::Fulfilled(value.into()))
        };

        match previous {
            Some(CacheEntry::Pending(in_flight)) => {
                debug!(
                    key,
                    elapsed_ms = in_flight.started_at.elapsed().as_millis() as u64,
                    "Production resolved"
                );
                in_flight.signal.fire();
            }
            Some(CacheEntry::Fulfilled(_)) => {
                debug!(key, scope = ?self.scope, "Fulfilled value overwritten");
            }
            None => {}
        }
    }

    /// Imports values produced elsewhere (the server, for a client cache).
    pub fn rehydrate<I, K, V>(&self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut imported = 0;
        for (key, value) in pairs {
            self.resolve(key.as_ref(), value);
            imported += 1;
        }
        imported
    }

    /// Fulfilled pairs ordered by key.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(key, entry)| entry.value().map(|value| (key.clone(), value.to_string())))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().values().filter(|entry| !entry.is_fulfilled()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_begin_pending_runs_one_production_per_key() {
        let cache = DataCache::shared(CacheScope::Render);
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            cache.begin_pending("foobar", async move {
                runs.fetch_add(1, Ordering::SeqCst);
                "raboof".to_string()
            });
        }

        let entry = cache.read("foobar").unwrap();
        if let CacheEntry::Pending(in_flight) = entry {
            in_flight.subscribe().settled().await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("foobar").unwrap().value(), Some("raboof"));
    }

    #[tokio::test]
    async fn test_fulfilled_entry_never_reverts() {
        let cache = DataCache::shared(CacheScope::Process);
        cache.resolve("key", "first");

        let entry = cache.begin_pending("key", async { "second".to_string() });
        assert_eq!(entry.value(), Some("first"));

        tokio::task::yield_now().await;
        assert!(cache.get("key").unwrap().is_fulfilled());
        assert_eq!(cache.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_wake_on_resolution() {
        let cache = DataCache::shared(CacheScope::PerRequest);
        let entry = cache.begin_pending("slow", async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "done".to_string()
        });

        let CacheEntry::Pending(in_flight) = entry else {
            panic!("expected a pending entry");
        };
        let first = in_flight.subscribe();
        let second = in_flight.subscribe();

        first.settled().await;
        assert!(second.is_settled());
        assert_eq!(cache.snapshot(), vec![("slow".to_string(), "done".to_string())]);
    }

    #[test]
    fn test_read_unknown_key_is_usage_error() {
        let cache = DataCache::new(CacheScope::Render);
        let error = cache.read("nope").unwrap_err();

        assert_eq!(error.code(), "VALIDATION");
        assert_eq!(error.get_property("key"), Some("nope"));
    }

    #[test]
    fn test_rehydrate_and_last_write_wins() {
        let cache = DataCache::new(CacheScope::Process);
        let imported = cache.rehydrate([("b", "2"), ("a", "1")]);
        assert_eq!(imported, 2);

        cache.resolve("a", "3");
        assert_eq!(
            cache.snapshot(),
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_empty());
    }
}
