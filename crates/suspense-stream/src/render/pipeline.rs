use axum::http::StatusCode;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::data::cache::CacheScope;
use crate::error::SsrError;
use crate::hydration::scripts::{
    SyncKind, boot_script, boundary_runtime_script, cache_sync_script, completion_script,
    error_script,
};
use crate::render::boundary::{BoundaryManager, boundary_id, segment_id};
use crate::render::envelope::{DOCUMENT_TAIL, DocumentEnvelope, error_document};
use crate::render::html::{escape_html_attribute, escape_text, push_close_tag, push_open_tag};
use crate::render::node::{Node, SuspenseNode};
use crate::render::scope::RenderScope;
use crate::render::stream::{ChunkKind, HtmlChunk, HtmlStream};
use crate::render::suspend::{Readiness, Signal, Subscription};
use crate::render::task::{RenderPhase, RenderTask};

pub const DEFAULT_ABORT_AFTER: Duration = Duration::from_millis(10_000);
pub const DEFAULT_BUFFER_SIZE: usize = 64;

const ABORTED_MESSAGE: &str = "The server did not finish this content before the render was aborted";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Ceiling for the whole render, measured from its start.
    pub abort_after: Duration,
    /// Chunks buffered between the render driver and the response body.
    pub buffer_size: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { abort_after: DEFAULT_ABORT_AFTER, buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

/// Cuts a render short: pending boundaries get an error instruction and the
/// document is closed.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    signal: Signal,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.signal.fire();
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_fired()
    }

    fn requested(&self) -> Subscription {
        self.signal.subscribe()
    }
}

/// A render whose shell is done. The status is final; the stream carries
/// the head, the shell and every later fragment.
#[derive(Debug)]
pub struct StreamingRender {
    pub status: StatusCode,
    pub task: Arc<RenderTask>,
    pub stream: HtmlStream,
    pub abort: AbortHandle,
}

#[derive(Debug, Clone, Default)]
pub struct StreamingRenderer {
    options: RenderOptions,
}

impl StreamingRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Renders the shell of `root`, then keeps resolving boundaries on a
    /// spawned driver task that feeds the returned stream.
    pub async fn render(
        &self,
        route: &str,
        root: Node,
        mut scope: RenderScope,
        envelope: DocumentEnvelope,
    ) -> StreamingRender {
        let task = Arc::new(RenderTask::new(route, self.options.abort_after));
        let abort = AbortHandle::default();
        let (sender, receiver) = mpsc::channel(self.options.buffer_size.max(1));
        let stream = HtmlStream::new(receiver);

        task.advance(RenderPhase::ShellPending);
        debug!(render_id = %task.id(), route, "Render started");

        let mut boundaries = BoundaryManager::new();
        match render_shell(&root, &mut scope, &mut boundaries, &task, &abort).await {
            Ok((markup, discovered)) => {
                task.commit_status(StatusCode::OK);
                task.advance(RenderPhase::ShellReady);
                info!(
                    render_id = %task.id(),
                    route,
                    elapsed_ms = task.elapsed().as_millis() as u64,
                    pending_boundaries = discovered.len(),
                    "Shell ready"
                );

                let driver = Driver {
                    task: Arc::clone(&task),
                    scope,
                    boundaries,
                    sender,
                    envelope,
                    abort: abort.clone(),
                    runtime_sent: false,
                };
                tokio::spawn(driver.run(markup, discovered));
            }
            Err(shell_error) => {
                task.commit_status(StatusCode::INTERNAL_SERVER_ERROR);
                task.advance(RenderPhase::Errored);
                error!(render_id = %task.id(), route, error = %shell_error, "Shell render failed");

                let chunk =
                    HtmlChunk::new(ChunkKind::ShellError, error_document(&shell_error.message()))
                        .final_chunk();
                if sender.try_send(chunk).is_err() {
                    error!(render_id = %task.id(), "Could not queue the error document");
                }
            }
        }

        let status = task.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        StreamingRender { status, task, stream, abort }
    }
}

/// Renders a tree that cannot suspend into a single string.
pub fn render_static(root: &Node) -> Result<String, SsrError> {
    let mut scope = RenderScope::passive();
    let mut boundaries = BoundaryManager::new();
    let mut discovered = Vec::new();
    let task = RenderTask::new("static", Duration::ZERO);

    let mut markup = String::new();
    match Walker::new(&mut scope, &mut boundaries, &mut discovered, &task, None)
        .attempt(root, &mut markup)
    {
        Ok(()) => Ok(markup),
        Err(Interrupt::Failed(error)) => Err(error),
        Err(Interrupt::Suspended(_)) => {
            Err(SsrError::render("a static render suspended outside any boundary"))
        }
    }
}

/// Retries the root until it renders without suspending outside a boundary.
async fn render_shell(
    root: &Node,
    scope: &mut RenderScope,
    boundaries: &mut BoundaryManager,
    task: &RenderTask,
    abort: &AbortHandle,
) -> Result<(String, Vec<PendingBoundary>), SsrError> {
    loop {
        let mut markup = String::new();
        let mut discovered = Vec::new();
        let result = Walker::new(&mut *scope, &mut *boundaries, &mut discovered, task, None)
            .attempt(root, &mut markup);

        let subscription = match result {
            Ok(()) => return Ok((markup, discovered)),
            Err(Interrupt::Failed(error)) => return Err(error),
            Err(Interrupt::Suspended(subscription)) => subscription,
        };

        debug!(render_id = %task.id(), "Shell suspended outside any boundary");
        tokio::select! {
            () = subscription.settled() => {}
            () = tokio::time::sleep_until(task.deadline()) => {
                return Err(SsrError::timeout("the shell did not become ready before the render deadline"));
            }
            () = abort.requested().settled() => {
                return Err(SsrError::aborted("the render was aborted before its shell was ready"));
            }
        }
    }
}

/// Boundary whose fallback was written and whose content is waiting on
/// `subscription`.
#[derive(Debug)]
struct PendingBoundary {
    number: u32,
    children: Node,
    subscription: Subscription,
}

fn settle(pending: PendingBoundary) -> impl Future<Output = PendingBoundary> + Send {
    async move {
        pending.subscription.clone().settled().await;
        pending
    }
}

#[derive(Debug)]
enum Interrupt {
    Suspended(Subscription),
    Failed(SsrError),
}

struct Walker<'a> {
    scope: &'a mut RenderScope,
    boundaries: &'a mut BoundaryManager,
    discovered: &'a mut Vec<PendingBoundary>,
    task: &'a RenderTask,
    parent: Option<u32>,
}

impl<'a> Walker<'a> {
    fn new(
        scope: &'a mut RenderScope,
        boundaries: &'a mut BoundaryManager,
        discovered: &'a mut Vec<PendingBoundary>,
        task: &'a RenderTask,
        parent: Option<u32>,
    ) -> Self {
        Self { scope, boundaries, discovered, task, parent }
    }

    /// Renders `node` into `out`. On interruption everything the attempt
    /// staged is withdrawn; `out` must then be dropped by the caller.
    fn attempt(&mut self, node: &Node, out: &mut String) -> Result<(), Interrupt> {
        let checkpoint = self.scope.checkpoint();
        let mark = self.boundaries.checkpoint();
        let discovered = self.discovered.len();

        let result = self.walk(node, out);
        if result.is_err() {
            self.scope.rollback(checkpoint);
            self.boundaries.discard_since(mark);
            self.discovered.truncate(discovered);
        }
        result
    }

    fn walk(&mut self, node: &Node, out: &mut String) -> Result<(), Interrupt> {
        match node {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Raw(markup) => out.push_str(markup),
            Node::Fragment(nodes) => {
                for child in nodes {
                    self.walk(child, out)?;
                }
            }
            Node::Element(element) => {
                push_open_tag(out, element);
                for child in &element.children {
                    self.walk(child, out)?;
                }
                push_close_tag(out, element);
            }
            Node::Component(component) => match component.call(&mut *self.scope) {
                Ok(Readiness::Ready(rendered)) => self.walk(&rendered, out)?,
                Ok(Readiness::Pending(subscription)) => {
                    return Err(Interrupt::Suspended(subscription));
                }
                Err(error) => {
                    return Err(Interrupt::Failed(error.with_property("component", component.name())));
                }
            },
            Node::Suspense(boundary) => self.walk_boundary(boundary, out)?,
        }
        Ok(())
    }

    fn walk_boundary(&mut self, boundary: &SuspenseNode, out: &mut String) -> Result<(), Interrupt> {
        let mut content = String::new();
        match self.attempt(&boundary.children, &mut content) {
            Ok(()) => {
                out.push_str("<!--$-->");
                out.push_str(&content);
                out.push_str("<!--/$-->");
            }
            Err(Interrupt::Suspended(subscription)) => {
                let number = self.boundaries.register(self.parent);
                out.push_str("<!--$?--><template id=\"");
                out.push_str(&boundary_id(number));
                out.push_str("\"></template>");
                self.walk(&boundary.fallback, out)?;
                out.push_str("<!--/$-->");

                self.discovered.push(PendingBoundary {
                    number,
                    children: boundary.children.clone(),
                    subscription,
                });
            }
            Err(Interrupt::Failed(error)) => {
                error!(render_id = %self.task.id(), error = %error, "Error contained by boundary");
                self.task.record_contained_error();

                out.push_str("<!--$!--><template data-msg=\"");
                out.push_str(&escape_html_attribute(&error.message()));
                out.push_str("\"></template>");
                self.walk(&boundary.fallback, out)?;
                out.push_str("<!--/$-->");
            }
        }
        Ok(())
    }
}

enum Wake {
    Boundary(PendingBoundary),
    Deadline,
    AbortRequested,
    Disconnected,
}

/// Owns everything a render needs after its shell: resolves boundaries in
/// the order their dependencies settle and writes the rest of the document.
struct Driver {
    task: Arc<RenderTask>,
    scope: RenderScope,
    boundaries: BoundaryManager,
    sender: mpsc::Sender<HtmlChunk>,
    envelope: DocumentEnvelope,
    abort: AbortHandle,
    runtime_sent: bool,
}

impl Driver {
    async fn run(mut self, shell: String, discovered: Vec<PendingBoundary>) {
        let render_id = self.task.id();
        if let Err(error) = self.drive(shell, discovered).await {
            match error {
                SsrError::Transport(..) => {
                    error!(%render_id, error = %error, "Render stopped: response body is gone");
                }
                SsrError::Timeout(..) | SsrError::Aborted(..) => {
                    warn!(%render_id, error = %error, "Render stopped with a stalled response body");
                }
                _ => error!(%render_id, error = %error, "Render stopped"),
            }
            self.task.advance(RenderPhase::Aborted);
        }
    }

    async fn drive(
        &mut self,
        mut shell: String,
        discovered: Vec<PendingBoundary>,
    ) -> Result<(), SsrError> {
        self.send(HtmlChunk::new(ChunkKind::Envelope, self.envelope.head())).await?;

        shell.push_str(&boot_script());
        self.send(HtmlChunk::new(ChunkKind::Shell, shell)).await?;

        let mut outstanding: FuturesUnordered<_> = discovered.into_iter().map(settle).collect();
        let deadline = tokio::time::sleep_until(self.task.deadline());
        tokio::pin!(deadline);
        let abort_requested = self.abort.requested().settled();
        tokio::pin!(abort_requested);

        let completed = loop {
            if outstanding.is_empty() {
                break true;
            }

            let wake = tokio::select! {
                biased;
                () = &mut abort_requested => Wake::AbortRequested,
                () = &mut deadline => Wake::Deadline,
                () = self.sender.closed() => Wake::Disconnected,
                Some(pending) = outstanding.next() => Wake::Boundary(pending),
            };

            match wake {
                Wake::Boundary(pending) => {
                    for next in self.retry(pending).await? {
                        outstanding.push(settle(next));
                    }
                }
                Wake::Deadline => {
                    warn!(
                        render_id = %self.task.id(),
                        pending = outstanding.len(),
                        "Render deadline reached"
                    );
                    break false;
                }
                Wake::AbortRequested => {
                    warn!(render_id = %self.task.id(), pending = outstanding.len(), "Render aborted");
                    break false;
                }
                Wake::Disconnected => {
                    return Err(SsrError::transport("client disconnected before the render finished"));
                }
            }
        };

        if !completed {
            self.task.advance(RenderPhase::Aborted);
            for number in self.boundaries.abort_pending() {
                let mut html = self.take_runtime();
                html.push_str(&error_script(&boundary_id(number), ABORTED_MESSAGE)?);
                self.send(HtmlChunk::new(ChunkKind::BoundaryError, html).for_boundary(number))
                    .await?;
            }
        }

        self.finish().await
    }

    /// Renders a boundary whose dependency settled. Returns what is pending
    /// afterwards: boundaries discovered inside the new content, or the same
    /// boundary again if it suspended on something else.
    async fn retry(&mut self, pending: PendingBoundary) -> Result<Vec<PendingBoundary>, SsrError> {
        let number = pending.number;
        let attempts = self.boundaries.record_attempt(number);

        let mut content = String::new();
        let mut discovered = Vec::new();
        let result = Walker::new(
            &mut self.scope,
            &mut self.boundaries,
            &mut discovered,
            &self.task,
            Some(number),
        )
        .attempt(&pending.children, &mut content);

        match result {
            Ok(()) => {
                self.boundaries.resolve(number);

                let mut html = self.take_runtime();
                html.push_str(&format!(r#"<div hidden id="{}">"#, segment_id(number)));
                html.push_str(&content);
                html.push_str("</div>");
                html.push_str(&completion_script(&boundary_id(number), &segment_id(number)));

                self.send(HtmlChunk::new(ChunkKind::BoundaryUpdate, html).for_boundary(number))
                    .await?;
                self.task.record_flush();
                debug!(
                    render_id = %self.task.id(),
                    boundary = %boundary_id(number),
                    attempts,
                    nested = discovered.len(),
                    elapsed_ms = self.task.elapsed().as_millis() as u64,
                    "Boundary flushed"
                );
                Ok(discovered)
            }
            Err(Interrupt::Suspended(subscription)) => {
                debug!(boundary = %boundary_id(number), attempts, "Boundary suspended again");
                Ok(vec![PendingBoundary { number, children: pending.children, subscription }])
            }
            Err(Interrupt::Failed(failure)) => {
                error!(
                    render_id = %self.task.id(),
                    boundary = %boundary_id(number),
                    error = %failure,
                    "Boundary failed, keeping its fallback"
                );
                self.boundaries.fail(number);
                self.task.record_contained_error();

                let mut html = self.take_runtime();
                html.push_str(&error_script(&boundary_id(number), &failure.message())?);
                self.send(HtmlChunk::new(ChunkKind::BoundaryError, html).for_boundary(number))
                    .await?;
                Ok(Vec::new())
            }
        }
    }

    async fn finish(&mut self) -> Result<(), SsrError> {
        let cache = Arc::clone(self.scope.cache());
        if cache.scope() == CacheScope::PerRequest {
            let script = cache_sync_script(SyncKind::Bulk, &cache.snapshot())?;
            self.send(HtmlChunk::new(ChunkKind::CacheSync, script)).await?;
        }

        self.send(HtmlChunk::new(ChunkKind::Envelope, DOCUMENT_TAIL).final_chunk()).await?;

        if self.task.advance(RenderPhase::AllReady) {
            info!(
                render_id = %self.task.id(),
                route = self.task.route(),
                flushed = self.task.flushed_boundaries(),
                contained_errors = self.task.contained_errors(),
                elapsed_ms = self.task.elapsed().as_millis() as u64,
                "All ready"
            );
        }
        Ok(())
    }

    /// The boundary runtime, the first time any boundary instruction is sent.
    fn take_runtime(&mut self) -> String {
        if self.runtime_sent {
            return String::new();
        }
        self.runtime_sent = true;
        boundary_runtime_script()
    }

    /// Queues `chunk`, giving up once the deadline passes or an abort is
    /// requested while the body is not being read.
    async fn send(&self, chunk: HtmlChunk) -> Result<(), SsrError> {
        tokio::select! {
            biased;
            sent = self.sender.send(chunk) => {
                sent.map_err(|_| SsrError::transport("response body receiver was dropped"))
            }
            () = tokio::time::sleep_until(self.task.deadline()) => {
                Err(SsrError::timeout("response body stalled past the render deadline"))
            }
            () = self.abort.requested().settled() => {
                Err(SsrError::aborted("render aborted while the response body was stalled"))
            }
        }
    }
}
