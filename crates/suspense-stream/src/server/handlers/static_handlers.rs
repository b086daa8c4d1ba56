use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::server::types::AppState;

/// Landing page linking to every route.
pub async fn root_handler(State(state): State<AppState>) -> Response {
    match state.routes.landing_page() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render landing page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found_handler() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
