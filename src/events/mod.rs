// events/mod.rs
use crate::models::StatusChanged;
use tokio::sync::broadcast;

const CAPACITY: usize = 100;

/// Fleet-wide status feed. Slow subscribers lag and skip events;
/// publishing never blocks a worker.
pub struct EventBus {
    tx: broadcast::Sender<StatusChanged>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: StatusChanged) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChanged> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
