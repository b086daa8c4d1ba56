use crate::error::SsrError;
use crate::server::config::Config;
use crate::server::handlers::app_handler::handle_app_route;
use crate::server::handlers::static_handlers::{not_found_handler, root_handler};
use crate::server::request_middleware::request_logger;
use crate::server::types::AppState;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{HeaderValue, header};
use axum::{Router, middleware, routing::get};
use colored::Colorize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

pub struct Server {
    router: Router,
    config: Config,
    listener: TcpListener,
    address: SocketAddr,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, SsrError> {
        let state = AppState::new(config.clone());
        let router = Self::build_router(&config, state)?;

        let address = config.server_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| SsrError::network(format!("Failed to bind to {address}: {e}")))?;

        let socket_addr = listener
            .local_addr()
            .map_err(|e| SsrError::network(format!("Failed to get local address: {e}")))?;

        Ok(Self { router, config, listener, address: socket_addr })
    }

    /// Routes every page to the streaming handler; anything else is looked
    /// up in the public directory before falling through to a 404.
    pub fn build_router(config: &Config, state: AppState) -> Result<Router, SsrError> {
        let mut router = Router::new().route("/", get(root_handler));
        for route in state.routes.iter() {
            router = router.route(route.path, get(handle_app_route));
        }

        let static_files =
            ServeDir::new(config.public_dir()).not_found_service(not_found_handler.into_service());

        router = if config.is_production() {
            let cache_control = HeaderValue::from_str(&config.static_files.cache_control)
                .map_err(|e| {
                    SsrError::configuration(format!(
                        "Invalid static cache-control header {:?}: {e}",
                        config.static_files.cache_control
                    ))
                })?;
            let static_service = ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(header::CACHE_CONTROL, cache_control))
                .service(static_files);
            router.fallback_service(static_service)
        } else {
            router.fallback_service(static_files)
        };

        let router = router.layer(middleware::from_fn(request_logger)).with_state(state);

        Ok(router)
    }

    pub async fn start(self) -> Result<(), SsrError> {
        self.display_startup_message();

        axum::serve(self.listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| SsrError::network(format!("Server error: {e}")))?;

        Ok(())
    }

    fn display_startup_message(&self) {
        let server_url = format!("http://{}", self.address);
        let mode = if self.config.is_production() {
            "Production".green()
        } else {
            "Development".yellow()
        };

        info!("{} {}", "Mode:".bold(), mode);
        info!("{} {}", "Listening on".bold(), server_url.cyan().underline());
        info!("{} {}", "Static files:".bold(), self.config.public_dir().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::Mode;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config(public_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.static_files.public_dir = public_dir.to_path_buf();
        config.data.fetch_delay_ms = 2000;
        config
    }

    fn router_for(config: Config) -> Router {
        Server::build_router(&config, AppState::new(config.clone())).unwrap()
    }

    fn get_request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_route_headers_and_body() {
        let public = tempfile::tempdir().unwrap();
        let router = router_for(test_config(public.path()));

        let response = router.oneshot(get_request("/basic-data")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("content-type").unwrap(), "text/html; charset=utf-8");
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
        assert_eq!(headers.get("cache-control").unwrap(), "no-cache");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");

        let html = body_string(response).await;
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<script type="module" async src="/client-basic-data.js">"#));
        assert!(html.contains(r#"<!--$?--><template id="B:0"></template>Loading...<!--/$-->"#));
        assert!(html.contains(r#"$RC("B:0","S:0")"#));
        assert!(html.contains(r#"<script data-cache-sync="stream">"#));
        assert!(html.ends_with("</html>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_streamed_route_flushes_cache_once() {
        let public = tempfile::tempdir().unwrap();
        let router = router_for(test_config(public.path()));

        let response =
            router.oneshot(get_request("/non-streamed-nested-data")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_string(response).await;
        assert!(!html.contains(r#"data-cache-sync="stream""#));
        assert_eq!(html.matches(r#"<script data-cache-sync="bulk">"#).count(), 1);
        let bulk = html.find(r#"data-cache-sync="bulk""#).unwrap();
        assert!(html.rfind("$RC(").unwrap() < bulk);
    }

    #[tokio::test]
    async fn test_landing_page() {
        let public = tempfile::tempdir().unwrap();
        let router = router_for(test_config(public.path()));

        let response = router.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/html"));

        let html = body_string(response).await;
        assert!(html.contains(r#"<a href="/nested">Nested Suspense Streaming SSR Example</a>"#));
        assert!(html.contains(r#"href="/non-streamed-nested-data""#));
    }

    #[tokio::test]
    async fn test_static_bundle_and_not_found() {
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("client-basic.js"), "init(\"/basic\");").unwrap();
        let router = router_for(test_config(public.path()));

        let response = router.clone().oneshot(get_request("/client-basic.js")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("cache-control").is_none());
        assert_eq!(body_string(response).await, "init(\"/basic\");");

        let response = router.oneshot(get_request("/does-not-exist")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_production_static_cache_control() {
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("client-init.js"), "export {}").unwrap();
        let mut config = test_config(public.path());
        config.mode = Mode::Production;
        let router = router_for(config);

        let response = router.oneshot(get_request("/client-init.js")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("cache-control").unwrap(), "public, max-age=3600");
    }

    #[tokio::test]
    async fn test_invalid_cache_control_is_rejected() {
        let public = tempfile::tempdir().unwrap();
        let mut config = test_config(public.path());
        config.mode = Mode::Production;
        config.static_files.cache_control = "bad\nvalue".to_string();

        let error = Server::build_router(&config, AppState::new(config.clone())).unwrap_err();
        assert_eq!(error.code(), "INTERNAL");
    }

    #[tokio::test]
    async fn test_post_to_route_is_method_not_allowed() {
        let public = tempfile::tempdir().unwrap();
        let router = router_for(test_config(public.path()));

        let request =
            Request::builder().method("POST").uri("/basic").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
