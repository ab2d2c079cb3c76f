//! Event system for run execution
//!
//! Provides typed event emission for run and node lifecycle transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::state::RunStatus;

/// Runtime event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        nodes: usize,
    },
    RunFinished {
        status: RunStatus,
    },
    NodeStarted {
        node_id: String,
        agent: String,
    },
    NodeRetrying {
        node_id: String,
        attempt: u32,
        error: String,
        delay_ms: u64,
    },
    NodeSucceeded {
        node_id: String,
        attempts: u32,
    },
    NodeFailed {
        node_id: String,
        attempts: u32,
        error: String,
    },
}

/// Event envelope with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEventEnvelope {
    pub sequence: u64,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: RunEvent,
}

impl RunEventEnvelope {
    pub fn new(run_id: impl Into<String>, event: RunEvent) -> Self {
        Self {
            sequence: next_sequence(),
            run_id: run_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Event sink trait for emitting events
pub trait EventSink: Send + Sync {
    /// Emit an event
    fn emit(&self, envelope: &RunEventEnvelope);
}

/// A simple logging event sink
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, envelope: &RunEventEnvelope) {
        tracing::debug!(run_id = %envelope.run_id, sequence = envelope.sequence, "Event: {:?}", envelope.event);
    }
}

/// A buffering event sink that collects events
#[derive(Default)]
pub struct BufferingEventSink {
    events: RwLock<Vec<RunEventEnvelope>>,
}

impl BufferingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<RunEventEnvelope> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events of one run, in emission order
    pub fn events_for(&self, run_id: &str) -> Vec<RunEvent> {
        self.get_events()
            .into_iter()
            .filter(|e| e.run_id == run_id)
            .map(|e| e.event)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl EventSink for BufferingEventSink {
    fn emit(&self, envelope: &RunEventEnvelope) {
        if let Ok(mut events) = self.events.write() {
            events.push(envelope.clone());
        }
    }
}

/// Fans events out to any number of async subscribers.
///
/// When a slow subscriber lets the channel fill up, the oldest event is
/// dropped for everyone.
pub struct BroadcastEventSink {
    tx: async_broadcast::Sender<RunEventEnvelope>,
    // Keeps the channel open while there are no subscribers.
    _keepalive: async_broadcast::InactiveReceiver<RunEventEnvelope>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (mut tx, rx) = async_broadcast::broadcast(capacity.max(1));
        tx.set_overflow(true);
        Self {
            tx,
            _keepalive: rx.deactivate(),
        }
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<RunEventEnvelope> {
        self.tx.new_receiver()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, envelope: &RunEventEnvelope) {
        if let Err(e) = self.tx.try_broadcast(envelope.clone()) {
            // Full is impossible with overflow enabled; Inactive means nobody listens.
            tracing::trace!("Dropped run event: {}", e);
        }
    }
}

/// Global sequence counter for events
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Get the next event sequence number
pub fn next_sequence() -> u64 {
    EVENT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}
