use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, watch};

/// Latest-value-wins slot between one sampler and any number of consumers.
///
/// Publishing swaps an `Arc` atomically, so a reader sees either the whole
/// previous value or the whole new one. Nothing is queued: a value that was
/// never read is simply replaced. Subscribers are woken through a
/// generation counter and then read the slot themselves.
pub struct SnapshotBus<T> {
    slot: ArcSwap<T>,
    generation: watch::Sender<u64>,
}

impl<T> SnapshotBus<T> {
    pub fn new(initial: T) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            slot: ArcSwap::from_pointee(initial),
            generation,
        }
    }

    pub fn publish(&self, value: T) {
        self.publish_arc(Arc::new(value));
    }

    pub fn publish_arc(&self, value: Arc<T>) {
        self.slot.store(value);
        self.generation.send_modify(|g| *g += 1);
    }

    pub fn latest(&self) -> Arc<T> {
        self.slot.load_full()
    }

    /// Number of values published so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotBus")
            .field("generation", &self.generation())
            .field("latest", &self.latest())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    Processes,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::System => write!(f, "system"),
            EventSource::Processes => write!(f, "processes"),
        }
    }
}

/// A recovered, tick-level collection failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEvent {
    pub source: EventSource,
    pub message: String,
    pub timestamp: SystemTime,
}

/// Fan-out of collection failures. Emitting never blocks; slow receivers
/// lose the oldest events.
#[derive(Debug)]
pub struct EventStream {
    tx: broadcast::Sender<CollectionEvent>,
    emitted: AtomicU64,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            emitted: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, source: EventSource, message: impl Into<String>) {
        let event = CollectionEvent {
            source,
            message: message.into(),
            timestamp: SystemTime::now(),
        };
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // No receivers is fine: the event is still counted.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.tx.subscribe()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
