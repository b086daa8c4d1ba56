pub mod streaming_response;

pub use streaming_response::StreamingHtmlResponse;
