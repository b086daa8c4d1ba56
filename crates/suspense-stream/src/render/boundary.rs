use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct BoundaryIdGenerator {
    counter: AtomicU32,
}

impl BoundaryIdGenerator {
    pub fn new() -> Self {
        Self { counter: AtomicU32::new(0) }
    }

    pub fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peek(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Hands out `mark` again; only valid when nothing issued since `mark`
    /// reached the output.
    fn rewind(&self, mark: u32) {
        self.counter.store(mark, Ordering::SeqCst);
    }
}

impl Default for BoundaryIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn boundary_id(n: u32) -> String {
    format!("B:{n}")
}

pub fn segment_id(n: u32) -> String {
    format!("S:{n}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    /// Fallback written, content outstanding.
    Pending,
    Resolved,
    Errored,
    /// Still pending when the render was cut off.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct BoundaryRecord {
    pub number: u32,
    pub parent: Option<u32>,
    pub state: BoundaryState,
    pub attempts: u32,
}

impl BoundaryRecord {
    pub fn boundary_id(&self) -> String {
        boundary_id(self.number)
    }
}

/// Bookkeeping for every boundary whose fallback reached the output.
#[derive(Debug, Default)]
pub struct BoundaryManager {
    ids: BoundaryIdGenerator,
    boundaries: FxHashMap<u32, BoundaryRecord>,
}

impl BoundaryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parent: Option<u32>) -> u32 {
        let number = self.ids.next();
        self.boundaries.insert(
            number,
            BoundaryRecord { number, parent, state: BoundaryState::Pending, attempts: 0 },
        );
        debug!(boundary = %boundary_id(number), ?parent, "Boundary registered");
        number
    }

    /// Marks the point after which registrations can still be withdrawn.
    pub fn checkpoint(&self) -> u32 {
        self.ids.peek()
    }

    /// Withdraws every registration made since `mark`, when the markup that
    /// carried them was abandoned before being written.
    pub fn discard_since(&mut self, mark: u32) {
        let before = self.boundaries.len();
        self.boundaries.retain(|number, _| *number < mark);
        if self.boundaries.len() != before {
            debug!(discarded = before - self.boundaries.len(), "Boundaries discarded");
        }
        self.ids.rewind(mark);
    }

    pub fn record_attempt(&mut self, number: u32) -> u32 {
        match self.boundaries.get_mut(&number) {
            Some(record) => {
                record.attempts += 1;
                record.attempts
            }
            None => 0,
        }
    }

    pub fn resolve(&mut self, number: u32) -> bool {
        self.transition(number, BoundaryState::Resolved)
    }

    pub fn fail(&mut self, number: u32) -> bool {
        self.transition(number, BoundaryState::Errored)
    }

    fn transition(&mut self, number: u32, next: BoundaryState) -> bool {
        match self.boundaries.get_mut(&number) {
            Some(record) if record.state == BoundaryState::Pending => {
                record.state = next;
                debug!(boundary = %record.boundary_id(), state = ?next, attempts = record.attempts, "Boundary settled");
                true
            }
            _ => false,
        }
    }

    /// Moves every pending boundary to `Aborted` and returns them in
    /// registration order.
    pub fn abort_pending(&mut self) -> Vec<u32> {
        let mut aborted: Vec<u32> = self
            .boundaries
            .values_mut()
            .filter(|record| record.state == BoundaryState::Pending)
            .map(|record| {
                record.state = BoundaryState::Aborted;
                record.number
            })
            .collect();
        aborted.sort_unstable();
        aborted
    }

    pub fn pending(&self) -> Vec<u32> {
        let mut pending: Vec<u32> = self
            .boundaries
            .values()
            .filter(|record| record.state == BoundaryState::Pending)
            .map(|record| record.number)
            .collect();
        pending.sort_unstable();
        pending
    }

    pub fn get(&self, number: u32) -> Option<&BoundaryRecord> {
        self.boundaries.get(&number)
    }

    pub fn state(&self, number: u32) -> Option<BoundaryState> {
        self.get(number).map(|record| record.state)
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}
