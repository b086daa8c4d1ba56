use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::cache::{CacheScope, DataCache};
use crate::render::pipeline::StreamingRenderer;
use crate::server::config::Config;
use crate::server::routing::RouteTable;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub routes: Arc<RouteTable>,
    /// Lives as long as the server; only handed to renders when
    /// `data.share_process_cache` is on.
    pub process_cache: Arc<DataCache>,
    pub renderer: StreamingRenderer,
    pub request_count: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let renderer = StreamingRenderer::new(config.render_options());
        Self {
            config: Arc::new(config),
            routes: Arc::new(RouteTable::default_routes()),
            process_cache: DataCache::shared(CacheScope::Process),
            renderer,
            request_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn shared_cache(&self) -> Option<&Arc<DataCache>> {
        self.config.data.share_process_cache.then_some(&self.process_cache)
    }

    /// Counts a render request and returns its sequence number.
    pub fn next_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_cache_follows_config() {
        let state = AppState::new(Config::default());
        assert!(state.shared_cache().is_none());

        let mut config = Config::default();
        config.data.share_process_cache = true;
        let state = AppState::new(config);
        let cache = state.shared_cache().unwrap();
        assert!(Arc::ptr_eq(cache, &state.process_cache));
        assert_eq!(cache.scope(), CacheScope::Process);
    }

    #[test]
    fn test_request_counter() {
        let state = AppState::new(Config::default());
        let clone = state.clone();
        assert_eq!(state.next_request(), 1);
        assert_eq!(clone.next_request(), 2);
        assert_eq!(state.request_count.load(Ordering::Relaxed), 2);
    }
}
