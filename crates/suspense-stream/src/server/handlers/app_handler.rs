use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::server::rendering::StreamingHtmlResponse;
use crate::server::types::AppState;

/// Streams the route registered for the request path.
pub async fn handle_app_route(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();
    let Some(route) = state.routes.get(path) else {
        warn!("No route registered for {}", path);
        return StatusCode::NOT_FOUND.into_response();
    };

    let request_number = state.next_request();
    debug!(route = route.path, request_number, "Rendering route");

    let instance = route.instantiate(state.shared_cache(), state.config.data_loader());
    let render = state
        .renderer
        .render(route.path, instance.root, instance.scope, instance.envelope)
        .await;

    StreamingHtmlResponse::from(render).into_response()
}
