use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::SsrError;
use crate::render::pipeline::StreamingRender;
use tracing::warn;

/// Chunked HTML body whose status was fixed before the first byte.
pub struct StreamingHtmlResponse {
    status: StatusCode,
    stream: Pin<Box<dyn Stream<Item = Result<Vec<u8>, SsrError>> + Send>>,
}

impl StreamingHtmlResponse {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, SsrError>> + Send + 'static,
    {
        Self { status: StatusCode::OK, stream: Box::pin(stream) }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<StreamingRender> for StreamingHtmlResponse {
    fn from(render: StreamingRender) -> Self {
        Self::new(render.stream).with_status(render.status)
    }
}

impl IntoResponse for StreamingHtmlResponse {
    fn into_response(self) -> Response {
        let stream = self.stream.map(|chunk| match chunk {
            Ok(bytes) => Ok(bytes::Bytes::from(bytes)),
            Err(error) => {
                if error.is_transport() {
                    warn!("Client disconnected during streaming: {}", error);
                }
                Err(std::io::Error::other(error.to_string()))
            }
        });

        Response::builder()
            .status(self.status)
            .header("content-type", "text/html; charset=utf-8")
            .header("transfer-encoding", "chunked")
            .header("x-content-type-options", "nosniff")
            .header("x-accel-buffering", "no")
            .header("cache-control", "no-cache")
            .body(Body::from_stream(stream))
            .expect("Valid streaming response")
    }
}
