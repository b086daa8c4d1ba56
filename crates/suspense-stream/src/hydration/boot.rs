use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const BUNDLE_READY: u8 = 0b01;
const CONTENT_DELIVERED: u8 = 0b10;
const BOTH: u8 = BUNDLE_READY | CONTENT_DELIVERED;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// This transition completed the pair; boot ran now.
    Booted,
    /// The other half has not arrived yet.
    Waiting,
    /// The same half was reported before.
    AlreadySignaled,
}

/// Two-input latch between "the bundle has loaded" and "the boot directive
/// was parsed". Whichever arrives second boots the page, exactly once.
#[derive(Debug, Default)]
pub struct BootLatch {
    state: AtomicU8,
    boots: AtomicUsize,
}

impl BootLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client bundle registered its boot function.
    pub fn bundle_ready(&self) -> BootOutcome {
        self.signal(BUNDLE_READY)
    }

    /// The boot directive after the shell executed.
    pub fn content_delivered(&self) -> BootOutcome {
        self.signal(CONTENT_DELIVERED)
    }

    fn signal(&self, bit: u8) -> BootOutcome {
        let previous = self.state.fetch_or(bit, Ordering::AcqRel);
        if previous & bit != 0 {
            return BootOutcome::AlreadySignaled;
        }
        if previous | bit == BOTH {
            self.boots.fetch_add(1, Ordering::AcqRel);
            return BootOutcome::Booted;
        }
        BootOutcome::Waiting
    }

    pub fn is_booted(&self) -> bool {
        self.state.load(Ordering::Acquire) == BOTH
    }

    pub fn boot_count(&self) -> usize {
        self.boots.load(Ordering::Acquire)
    }
}
