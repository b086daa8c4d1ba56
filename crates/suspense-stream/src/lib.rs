pub mod app;
pub mod data;
pub mod error;
pub mod hydration;
pub mod render;
pub mod server;

pub use data::{CacheEntry, CacheScope, DataCache, DataLoader, Loaded, load_data};
pub use error::SsrError;
pub use render::{
    DocumentEnvelope, HtmlStream, Node, Readiness, RenderOptions, RenderPhase, RenderScope,
    RenderTask, StreamingRender, StreamingRenderer, Subscription, SyncMode,
};
