use std::sync::Arc;

use crate::app::pages;
use crate::data::cache::{CacheScope, DataCache};
use crate::data::loader::DataLoader;
use crate::error::SsrError;
use crate::render::envelope::DocumentEnvelope;
use crate::render::node::{Node, el};
use crate::render::pipeline::render_static;
use crate::render::scope::{RenderScope, SyncMode};

/// Where a route's data cache lives and how its values reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBinding {
    /// Render-lifetime cache (or the shared process cache when enabled),
    /// values streamed inline next to the markup that used them.
    Ambient,
    /// Fresh cache per request, flushed once after the last boundary.
    PerRequest,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub path: &'static str,
    pub title: &'static str,
    pub bundle: &'static str,
    pub cache: CacheBinding,
    view: fn() -> Node,
}

/// Everything one request needs to start rendering a route.
#[derive(Debug)]
pub struct RouteInstance {
    pub root: Node,
    pub scope: RenderScope,
    pub envelope: DocumentEnvelope,
}

impl Route {
    pub fn new(
        path: &'static str,
        title: &'static str,
        bundle: &'static str,
        cache: CacheBinding,
        view: fn() -> Node,
    ) -> Self {
        Self { path, title, bundle, cache, view }
    }

    /// Builds a fresh tree and scope. Nothing is shared between two
    /// instances except `process_cache`, when one is given.
    pub fn instantiate(
        &self,
        process_cache: Option<&Arc<DataCache>>,
        loader: DataLoader,
    ) -> RouteInstance {
        let scope = match self.cache {
            CacheBinding::Ambient => {
                let cache = process_cache
                    .map(Arc::clone)
                    .unwrap_or_else(|| DataCache::shared(CacheScope::Render));
                RenderScope::new(cache, loader, SyncMode::Streamed)
            }
            CacheBinding::PerRequest => RenderScope::new(
                DataCache::shared(CacheScope::PerRequest),
                loader,
                SyncMode::Deferred,
            ),
        };

        RouteInstance {
            root: (self.view)(),
            scope,
            envelope: DocumentEnvelope::new(self.title, self.bundle),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn default_routes() -> Self {
        Self::new(vec![
            Route::new(
                "/basic",
                "Basic Suspense Streaming SSR Example",
                "client-basic.js",
                CacheBinding::Ambient,
                pages::basic,
            ),
            Route::new(
                "/nested",
                "Nested Suspense Streaming SSR Example",
                "client-nested.js",
                CacheBinding::Ambient,
                pages::nested,
            ),
            Route::new(
                "/basic-data",
                "Basic Suspense Streaming SSR Example With Data Dependency",
                "client-basic-data.js",
                CacheBinding::Ambient,
                pages::basic_data,
            ),
            Route::new(
                "/nested-data",
                "Nested Suspense Streaming SSR Example With Data Dependency",
                "client-nested-data.js",
                CacheBinding::Ambient,
                pages::nested_data,
            ),
            Route::new(
                "/non-streamed-nested-data",
                "Nested Suspense Streaming SSR Example With Data Dependency, \
                 Without Data Streaming (Intended to be broken)",
                "client-non-streamed-nested-data.js",
                CacheBinding::PerRequest,
                pages::non_streamed_nested_data,
            ),
        ])
    }

    pub fn get(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Ordered list of links to every route.
    pub fn landing_page(&self) -> Result<String, SsrError> {
        let links = self
            .routes
            .iter()
            .map(|route| el("li").child(el("a").attr("href", route.path).child(route.title)));
        render_static(&el("ol").children(links).into())
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::default_routes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_routes() {
        let table = RouteTable::default_routes();
        assert_eq!(table.len(), 5);

        let paths: Vec<_> = table.iter().map(|route| route.path).collect();
        assert_eq!(
            paths,
            ["/basic", "/nested", "/basic-data", "/nested-data", "/non-streamed-nested-data"]
        );
        assert_eq!(table.get("/nested").unwrap().bundle, "client-nested.js");
        assert!(table.get("/missing").is_none());
        assert!(table.get("/basic/").is_none());
    }

    #[test]
    fn test_cache_bindings() {
        let table = RouteTable::default_routes();
        let loader = DataLoader::new(Duration::from_millis(10));

        let ambient = table.get("/nested-data").unwrap().instantiate(None, loader.clone());
        assert_eq!(ambient.scope.cache().scope(), CacheScope::Render);
        assert_eq!(ambient.scope.sync_mode(), SyncMode::Streamed);

        let per_request =
            table.get("/non-streamed-nested-data").unwrap().instantiate(None, loader.clone());
        assert_eq!(per_request.scope.cache().scope(), CacheScope::PerRequest);
        assert_eq!(per_request.scope.sync_mode(), SyncMode::Deferred);
        assert_eq!(per_request.envelope.bundle(), "client-non-streamed-nested-data.js");
    }

    #[test]
    fn test_instances_do_not_share_caches() {
        let route = RouteTable::default_routes().get("/basic-data").cloned().unwrap();
        let loader = DataLoader::new(Duration::from_millis(10));

        let first = route.instantiate(None, loader.clone());
        let second = route.instantiate(None, loader.clone());
        assert!(!Arc::ptr_eq(first.scope.cache(), second.scope.cache()));

        let shared = DataCache::shared(CacheScope::Process);
        let first = route.instantiate(Some(&shared), loader.clone());
        let second = route.instantiate(Some(&shared), loader);
        assert!(Arc::ptr_eq(first.scope.cache(), second.scope.cache()));
        assert_eq!(first.scope.cache().scope(), CacheScope::Process);
    }

    #[test]
    fn test_per_request_route_ignores_process_cache() {
        let route = RouteTable::default_routes().get("/non-streamed-nested-data").cloned().unwrap();
        let shared = DataCache::shared(CacheScope::Process);

        let instance = route.instantiate(Some(&shared), DataLoader::new(Duration::ZERO));
        assert!(!Arc::ptr_eq(instance.scope.cache(), &shared));
    }

    #[test]
    fn test_landing_page_links() {
        let html = RouteTable::default_routes().landing_page().unwrap();
        assert!(html.starts_with("<ol><li><a href=\"/basic\">"));
        assert!(html.contains(
            "<a href=\"/basic-data\">Basic Suspense Streaming SSR Example With Data Dependency</a>"
        ));
        assert!(html.ends_with("</a></li></ol>"));
        assert_eq!(html.matches("<li>").count(), 5);
    }
}
