use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::render::node::{Node, component};
use crate::render::scope::RenderScope;
use crate::render::suspend::{Readiness, Signal};

#[derive(Debug)]
enum SlotState {
    Waiting(Signal),
    Elapsed,
}

/// Memoized timers keyed by slot, one registry per render.
#[derive(Debug, Default)]
pub struct DelayRegistry {
    slots: Mutex<FxHashMap<String, SlotState>>,
}

impl DelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first call for `slot` starts its timer; retries reuse it.
    pub fn wait(self: &Arc<Self>, scope: &RenderScope, slot: &str, duration: Duration) -> Readiness<()> {
        if !scope.can_suspend() {
            return Readiness::Ready(());
        }

        let mut slots = self.slots.lock();
        match slots.get(slot) {
            Some(SlotState::Elapsed) => return Readiness::Ready(()),
            Some(SlotState::Waiting(signal)) => return Readiness::Pending(signal.subscribe()),
            None => {}
        }

        let signal = Signal::new();
        let subscription = signal.subscribe();
        slots.insert(slot.to_string(), SlotState::Waiting(signal.clone()));
        drop(slots);

        debug!(slot, delay_ms = duration.as_millis() as u64, "Delay started");

        let registry = Arc::clone(self);
        let owned_slot = slot.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            registry.slots.lock().insert(owned_slot, SlotState::Elapsed);
            signal.fire();
        });

        Readiness::Pending(subscription)
    }

    pub fn is_elapsed(&self, slot: &str) -> bool {
        matches!(self.slots.lock().get(slot), Some(SlotState::Elapsed))
    }
}

/// Renders `children` once `ms` milliseconds have passed since the slot was
/// first reached.
pub fn delayed(slot: &'static str, ms: u64, children: impl Into<Node>) -> Node {
    let children = children.into();
    component("Delayed", move |scope| {
        Ok(scope.wait_delay(slot, Duration::from_millis(ms)).map(|()| children.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache::{CacheScope, DataCache};
    use crate::data::loader::DataLoader;
    use crate::render::scope::SyncMode;
    use tokio::time::Instant;

    fn active_scope() -> RenderScope {
        RenderScope::new(DataCache::shared(CacheScope::Render), DataLoader::default(), SyncMode::Streamed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_restart_timer() {
        let scope = active_scope();
        let started = Instant::now();

        let Readiness::Pending(first) = scope.wait_delay("outer", Duration::from_millis(3000)) else {
            panic!("first wait must suspend");
        };

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let Readiness::Pending(retry) = scope.wait_delay("outer", Duration::from_millis(3000)) else {
            panic!("timer has not elapsed yet");
        };

        retry.settled().await;
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
        assert!(first.is_settled());
        assert!(scope.wait_delay("outer", Duration::from_millis(3000)).is_ready());
        assert!(scope.delays().is_elapsed("outer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_independent() {
        let scope = active_scope();
        assert!(!scope.wait_delay("a", Duration::from_millis(100)).is_ready());
        assert!(!scope.wait_delay("b", Duration::from_millis(500)).is_ready());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scope.wait_delay("a", Duration::from_millis(100)).is_ready());
        assert!(!scope.wait_delay("b", Duration::from_millis(500)).is_ready());
    }

    #[test]
    fn test_passive_scope_never_waits() {
        let scope = RenderScope::passive();
        assert!(scope.wait_delay("slot", Duration::from_secs(60)).is_ready());
        assert!(!scope.delays().is_elapsed("slot"));
    }
}
