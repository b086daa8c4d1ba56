use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of reading something that may not be available yet.
///
/// A render pass that receives `Pending` abandons the subtree below that point
/// and is retried once the subscription settles.
#[derive(Debug)]
pub enum Readiness<T> {
    Ready(T),
    Pending(Subscription),
}

impl<T> Readiness<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Readiness<U> {
        match self {
            Self::Ready(value) => Readiness::Ready(f(value)),
            Self::Pending(subscription) => Readiness::Pending(subscription),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending(_) => None,
        }
    }
}

/// One-shot completion flag shared between a producer and any number of
/// suspended readers.
#[derive(Debug, Clone)]
pub struct Signal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    pub fn fire(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { receiver: self.sender.subscribe() }
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    receiver: watch::Receiver<bool>,
}

impl Subscription {
    pub fn is_settled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal fired. A dropped producer also settles the
    /// subscription so the retry can observe whatever state was left behind.
    pub async fn settled(mut self) {
        let _ = self.receiver.wait_for(|fired| *fired).await;
    }
}
