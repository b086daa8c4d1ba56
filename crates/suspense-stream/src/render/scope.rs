use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::data::cache::{CacheScope, DataCache};
use crate::data::loader::DataLoader;
use crate::render::delay::DelayRegistry;
use crate::render::suspend::Readiness;

/// How values read during a render reach the client cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// One inline instruction per key, next to the markup that used it.
    Streamed,
    /// Nothing inline; the owner of the cache serializes it at stream end.
    Deferred,
}

/// Position in the observation ledger to roll back to when a subtree is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Everything a component may consult while rendering: the data cache, the
/// delay slots and the record of which keys this response already mirrored.
#[derive(Debug)]
pub struct RenderScope {
    cache: Arc<DataCache>,
    delays: Arc<DelayRegistry>,
    loader: DataLoader,
    sync_mode: SyncMode,
    can_suspend: bool,
    observed: FxHashSet<String>,
    staged: Vec<String>,
}

impl RenderScope {
    pub fn new(cache: Arc<DataCache>, loader: DataLoader, sync_mode: SyncMode) -> Self {
        Self {
            cache,
            delays: Arc::new(DelayRegistry::new()),
            loader,
            sync_mode,
            can_suspend: true,
            observed: FxHashSet::default(),
            staged: Vec::new(),
        }
    }

    /// A scope for static renders: nothing suspends and nothing is mirrored.
    pub fn passive() -> Self {
        let mut scope = Self::new(
            DataCache::shared(CacheScope::Render),
            DataLoader::default(),
            SyncMode::Deferred,
        );
        scope.can_suspend = false;
        scope
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn delays(&self) -> &Arc<DelayRegistry> {
        &self.delays
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn can_suspend(&self) -> bool {
        self.can_suspend
    }

    /// Records that `key` is about to be mirrored. Returns false when an
    /// earlier, still committed, observation already covered it.
    pub fn observe_key(&mut self, key: &str) -> bool {
        if !self.observed.insert(key.to_string()) {
            return false;
        }
        self.staged.push(key.to_string());
        true
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.staged.len())
    }

    /// Forgets every observation made after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        if checkpoint.0 >= self.staged.len() {
            return;
        }
        for key in self.staged.drain(checkpoint.0..) {
            self.observed.remove(&key);
        }
    }

    #[cfg(test)]
    fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Suspends until `duration` has elapsed since the first wait on `slot`.
    pub fn wait_delay(&self, slot: &str, duration: Duration) -> Readiness<()> {
        self.delays.wait(self, slot, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_key_once() {
        let mut scope = RenderScope::passive();
        assert!(scope.observe_key("foobar"));
        assert!(!scope.observe_key("foobar"));
        assert!(scope.observe_key("fizzbuzz"));
        assert_eq!(scope.observed_count(), 2);
    }

    #[test]
    fn test_nested_rollback() {
        let mut scope = RenderScope::passive();
        scope.observe_key("a");

        let outer = scope.checkpoint();
        scope.observe_key("b");
        let inner = scope.checkpoint();
        scope.observe_key("c");

        scope.rollback(inner);
        assert!(scope.observe_key("c"));
        assert!(!scope.observe_key("b"));

        scope.rollback(outer);
        assert!(scope.observe_key("b"));
        assert!(!scope.observe_key("a"));
    }

    #[test]
    fn test_passive_scope_flags() {
        let scope = RenderScope::passive();
        assert!(!scope.can_suspend());
        assert_eq!(scope.sync_mode(), SyncMode::Deferred);
        assert_eq!(scope.cache().scope(), CacheScope::Render);
    }
}
