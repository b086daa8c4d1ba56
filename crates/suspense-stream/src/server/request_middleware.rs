use axum::{
    extract::MatchedPath,
    http::{Method, Request, Response},
    middleware::Next,
};
use std::time::{Duration, Instant};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

/// Opens an `http_request` span per request and logs its completion.
///
/// For streamed routes the logged duration covers the shell only: the
/// response is handed back as soon as the status is known.
pub async fn request_logger(
    request: Request<axum::body::Body>,
    next: Next,
) -> Response<axum::body::Body> {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4();

    let method = request.method().clone();
    let uri = request.uri().clone();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());

    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        request_id = %request_id,
    );

    async move {
        info!(
            target: "suspense_stream::http",
            method = %method,
            path = %path,
            request_id = %request_id,
            "Request started"
        );

        let response = next.run(request).await;
        let status_code = response.status().as_u16();

        log_request_completion(&method, &path, status_code, start_time.elapsed(), request_id);

        response
    }
    .instrument(span)
    .await
}

fn log_request_completion(
    method: &Method,
    path: &str,
    status_code: u16,
    duration: Duration,
    request_id: Uuid,
) {
    let duration_ms = duration.as_millis();

    match status_code {
        200..=399 => {
            info!(
                target: "suspense_stream::http",
                method = %method,
                path = %path,
                status = status_code,
                duration_ms = duration_ms,
                request_id = %request_id,
                "Request completed"
            );
        }
        400..=499 => {
            warn!(
                target: "suspense_stream::http",
                method = %method,
                path = %path,
                status = status_code,
                duration_ms = duration_ms,
                request_id = %request_id,
                "Request completed with client error"
            );
        }
        _ => {
            warn!(
                target: "suspense_stream::http",
                method = %method,
                path = %path,
                status = status_code,
                duration_ms = duration_ms,
                request_id = %request_id,
                "Request completed with server error"
            );
        }
    }
}
