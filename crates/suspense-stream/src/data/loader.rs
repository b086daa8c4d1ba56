use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::data::cache::CacheEntry;
use crate::error::SsrError;
use crate::hydration::scripts::cache_sync_node;
use crate::render::node::Node;
use crate::render::scope::{RenderScope, SyncMode};
use crate::render::suspend::Readiness;

pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(2000);

/// Value read through the loader, plus the side-channel script that mirrors
/// it into the client cache the first time this response observes the key.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub key: String,
    pub value: String,
    sync: Option<Node>,
}

impl Loaded {
    pub fn has_sync_script(&self) -> bool {
        self.sync.is_some()
    }

    /// Empty unless this is the first observation in a streamed render.
    pub fn sync_script(&self) -> Node {
        self.sync.clone().unwrap_or_else(Node::empty)
    }
}

#[derive(Debug, Clone)]
pub struct DataLoader {
    fetch_delay: Duration,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_DELAY)
    }
}

impl DataLoader {
    pub fn new(fetch_delay: Duration) -> Self {
        Self { fetch_delay }
    }

    pub fn fetch_delay(&self) -> Duration {
        self.fetch_delay
    }

    pub fn load(&self, scope: &mut RenderScope, key: &str) -> Result<Readiness<Loaded>, SsrError> {
        let cache = Arc::clone(scope.cache());

        let entry = match cache.get(key) {
            Some(entry) => entry,
            None if !scope.can_suspend() => {
                return Err(passive_miss(key));
            }
            None => cache.begin_pending(key, self.produce(key)),
        };

        match entry {
            CacheEntry::Fulfilled(value) => {
                let sync = if scope.sync_mode() == SyncMode::Streamed && scope.observe_key(key) {
                    Some(cache_sync_node(key, &value)?)
                } else {
                    None
                };

                Ok(Readiness::Ready(Loaded { key: key.to_string(), value, sync }))
            }
            CacheEntry::Pending(_) if !scope.can_suspend() => Err(passive_miss(key)),
            CacheEntry::Pending(in_flight) => Ok(Readiness::Pending(in_flight.subscribe())),
        }
    }

    fn produce(&self, key: &str) -> impl Future<Output = String> + Send + 'static {
        let delay = self.fetch_delay;
        let key = key.to_string();
        async move {
            tokio::time::sleep(delay).await;
            simulated_value(&key)
        }
    }
}

fn passive_miss(key: &str) -> SsrError {
    SsrError::render(format!("'{key}' is not cached and this render cannot suspend"))
        .with_property("key", key)
}

/// Reads `key` through the scope's loader.
pub fn load_data(scope: &mut RenderScope, key: &str) -> Result<Readiness<Loaded>, SsrError> {
    let loader = scope.loader().clone();
    loader.load(scope, key)
}

/// The reversed key with the current Unix time in milliseconds appended, so a
/// client-side refetch is visibly different from the server's value.
pub fn simulated_value(key: &str) -> String {
    let reversed: String = key.chars().rev().collect();
    format!("{reversed}{}", chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::{CacheScope, DataCache};

    fn streamed_scope(cache: &Arc<DataCache>) -> RenderScope {
        RenderScope::new(Arc::clone(cache), DataLoader::new(Duration::from_millis(2000)), SyncMode::Streamed)
    }

    #[test]
    fn test_simulated_value_reverses_key() {
        let value = simulated_value("foobar");
        assert!(value.starts_with("raboof"));
        assert!(value["raboof".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_suspends_then_reads_fulfilled_value() {
        let cache = DataCache::shared(CacheScope::Render);
        let mut scope = streamed_scope(&cache);

        let Readiness::Pending(subscription) = load_data(&mut scope, "foobar").unwrap() else {
            panic!("first read must suspend");
        };

        let started = tokio::time::Instant::now();
        subscription.settled().await;
        assert_eq!(started.elapsed(), Duration::from_millis(2000));

        let loaded = load_data(&mut scope, "foobar").unwrap().ready().unwrap();
        assert!(loaded.value.starts_with("raboof"));
        assert!(loaded.has_sync_script());
    }

    #[test]
    fn test_sync_script_only_on_first_observation() {
        let cache = DataCache::shared(CacheScope::Render);
        cache.resolve("fizzbuzz", "zzubzzif1");
        let mut scope = streamed_scope(&cache);

        let first = load_data(&mut scope, "fizzbuzz").unwrap().ready().unwrap();
        let second = load_data(&mut scope, "fizzbuzz").unwrap().ready().unwrap();

        assert!(first.has_sync_script());
        assert!(!second.has_sync_script());
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn test_deferred_mode_never_emits_inline_script() {
        let cache = DataCache::shared(CacheScope::PerRequest);
        cache.resolve("foobar", "raboof1");
        let mut scope = RenderScope::new(Arc::clone(&cache), DataLoader::default(), SyncMode::Deferred);

        let loaded = load_data(&mut scope, "foobar").unwrap().ready().unwrap();
        assert!(!loaded.has_sync_script());
    }

    #[test]
    fn test_passive_scope_refuses_to_suspend() {
        let mut scope = RenderScope::passive();
        let error = load_data(&mut scope, "foobar").unwrap_err();

        assert_eq!(error.code(), "RENDER_ERROR");
        assert!(scope.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolled_back_observation_is_emitted_again() {
        let cache = DataCache::shared(CacheScope::Render);
        cache.resolve("foobar", "raboof1");
        let mut scope = streamed_scope(&cache);

        let checkpoint = scope.checkpoint();
        assert!(load_data(&mut scope, "foobar").unwrap().ready().unwrap().has_sync_script());
        scope.rollback(checkpoint);

        assert!(load_data(&mut scope, "foobar").unwrap().ready().unwrap().has_sync_script());
    }
}
