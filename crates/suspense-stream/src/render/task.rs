use axum::http::StatusCode;
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Started,
    ShellPending,
    ShellReady,
    AllReady,
    Aborted,
    Errored,
}

impl RenderPhase {
    fn is_terminal(self) -> bool {
        matches!(self, Self::AllReady | Self::Aborted | Self::Errored)
    }

    fn can_advance_to(self, next: Self) -> bool {
        use RenderPhase::{Aborted, AllReady, Errored, ShellPending, ShellReady, Started};

        match (self, next) {
            (Started, ShellPending) => true,
            (ShellPending, ShellReady) => true,
            (ShellReady, AllReady) => true,
            (from, Aborted | Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Per-request record of one streaming render.
#[derive(Debug)]
pub struct RenderTask {
    id: Uuid,
    route: String,
    started_at: Instant,
    deadline: Instant,
    phase: Mutex<RenderPhase>,
    status: OnceLock<StatusCode>,
    shell_ready: AtomicBool,
    all_ready: AtomicBool,
    errored: AtomicBool,
    flushed: AtomicUsize,
    contained_errors: AtomicUsize,
}

impl RenderTask {
    pub fn new(route: impl Into<String>, abort_after: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            id: Uuid::new_v4(),
            route: route.into(),
            started_at,
            deadline: started_at + abort_after,
            phase: Mutex::new(RenderPhase::Started),
            status: OnceLock::new(),
            shell_ready: AtomicBool::new(false),
            all_ready: AtomicBool::new(false),
            errored: AtomicBool::new(false),
            flushed: AtomicUsize::new(0),
            contained_errors: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn phase(&self) -> RenderPhase {
        *self.phase.lock()
    }

    /// Moves to `next` if the transition is legal. Phases never go backwards
    /// and nothing leaves a terminal phase.
    pub fn advance(&self, next: RenderPhase) -> bool {
        let mut phase = self.phase.lock();
        if !phase.can_advance_to(next) {
            debug!(render_id = %self.id, from = ?*phase, to = ?next, "Ignored phase transition");
            return false;
        }

        *phase = next;
        match next {
            RenderPhase::ShellReady => self.shell_ready.store(true, Ordering::Release),
            RenderPhase::AllReady => self.all_ready.store(true, Ordering::Release),
            RenderPhase::Errored => self.errored.store(true, Ordering::Release),
            _ => {}
        }
        true
    }

    /// The first committed status wins; later calls return it unchanged.
    pub fn commit_status(&self, status: StatusCode) -> StatusCode {
        *self.status.get_or_init(|| status)
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status.get().copied()
    }

    pub fn is_shell_ready(&self) -> bool {
        self.shell_ready.load(Ordering::Acquire)
    }

    pub fn is_all_ready(&self) -> bool {
        self.all_ready.load(Ordering::Acquire)
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    pub fn record_flush(&self) {
        self.flushed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn flushed_boundaries(&self) -> usize {
        self.flushed.load(Ordering::Acquire)
    }

    pub fn record_contained_error(&self) {
        self.contained_errors.fetch_add(1, Ordering::AcqRel);
    }

    pub fn contained_errors(&self) -> usize {
        self.contained_errors.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_monotonic() {
        let task = RenderTask::new("/basic", Duration::from_secs(10));
        assert_eq!(task.phase(), RenderPhase::Started);

        assert!(!task.advance(RenderPhase::ShellReady));
        assert!(task.advance(RenderPhase::ShellPending));
        assert!(task.advance(RenderPhase::ShellReady));
        assert!(!task.advance(RenderPhase::ShellPending));
        assert!(task.advance(RenderPhase::AllReady));

        assert!(!task.advance(RenderPhase::Aborted));
        assert_eq!(task.phase(), RenderPhase::AllReady);
        assert!(task.is_shell_ready());
        assert!(task.is_all_ready());
    }

    #[test]
    fn test_abort_from_shell_ready() {
        let task = RenderTask::new("/nested", Duration::from_secs(10));
        task.advance(RenderPhase::ShellPending);
        task.advance(RenderPhase::ShellReady);

        assert!(task.advance(RenderPhase::Aborted));
        assert!(!task.advance(RenderPhase::AllReady));
        assert!(!task.is_errored());
    }

    #[test]
    fn test_error_before_shell() {
        let task = RenderTask::new("/basic-data", Duration::from_secs(10));
        task.advance(RenderPhase::ShellPending);

        assert!(task.advance(RenderPhase::Errored));
        assert!(task.is_errored());
        assert!(!task.is_shell_ready());
    }

    #[test]
    fn test_status_committed_once() {
        let task = RenderTask::new("/basic", Duration::from_secs(10));
        assert_eq!(task.status(), None);

        assert_eq!(task.commit_status(StatusCode::OK), StatusCode::OK);
        assert_eq!(task.commit_status(StatusCode::INTERNAL_SERVER_ERROR), StatusCode::OK);
        assert_eq!(task.status(), Some(StatusCode::OK));
    }
}
