pub mod boundary;
pub mod delay;
pub mod envelope;
pub mod html;
pub mod node;
pub mod pipeline;
pub mod scope;
pub mod stream;
pub mod suspend;
pub mod task;


pub use boundary::{BoundaryManager, BoundaryState};
pub use delay::{DelayRegistry, delayed};
pub use envelope::{DOCUMENT_TAIL, DocumentEnvelope};
pub use node::{Element, Node, component, el, fragment, raw, suspense, text};
pub use pipeline::{AbortHandle, RenderOptions, StreamingRender, StreamingRenderer, render_static};
pub use scope::{RenderScope, SyncMode};
pub use stream::{ChunkKind, HtmlChunk, HtmlStream};
pub use suspend::{Readiness, Signal, Subscription};
pub use task::{RenderPhase, RenderTask};
