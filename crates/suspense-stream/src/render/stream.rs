use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::SsrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Document head or tail.
    Envelope,
    /// Shell markup followed by the boot directive.
    Shell,
    BoundaryUpdate,
    BoundaryError,
    CacheSync,
    /// Replacement document for a render that failed before its shell.
    ShellError,
}

#[derive(Debug, Clone)]
pub struct HtmlChunk {
    pub data: Vec<u8>,
    pub kind: ChunkKind,
    pub boundary: Option<u32>,
    pub is_final: bool,
}

impl HtmlChunk {
    pub fn new(kind: ChunkKind, data: impl Into<String>) -> Self {
        Self { data: data.into().into_bytes(), kind, boundary: None, is_final: false }
    }

    pub fn for_boundary(mut self, number: u32) -> Self {
        self.boundary = Some(number);
        self
    }

    pub fn final_chunk(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.data).unwrap_or_default()
    }
}

/// Receiving end of a render: ends when the renderer drops its sender.
pub struct HtmlStream {
    receiver: mpsc::Receiver<HtmlChunk>,
}

impl std::fmt::Debug for HtmlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlStream").field("closed", &self.receiver.is_closed()).finish()
    }
}

impl HtmlStream {
    pub fn new(receiver: mpsc::Receiver<HtmlChunk>) -> Self {
        Self { receiver }
    }

    pub async fn next_chunk(&mut self) -> Option<HtmlChunk> {
        self.receiver.recv().await
    }

    pub fn is_complete(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

impl Stream for HtmlStream {
    type Item = Result<Vec<u8>, SsrError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk.data))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
