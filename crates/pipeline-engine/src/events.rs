//! Event types for streaming pipeline progress
//!
//! Events are sent from the scheduler to any consumer to report run and
//! process lifecycle changes while a pipeline executes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Trait for sending pipeline events
///
/// This abstracts over the transport mechanism (channel, log, collector)
/// so schedulers don't care who is listening.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// The scheduler started driving the pipeline
    #[serde(rename_all = "camelCase")]
    RunStarted {
        execution_id: String,
        processes: Vec<String>,
    },

    /// Every process finished and none failed
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        execution_id: String,
        aborted: bool,
        elapsed_ms: u64,
    },

    /// Every process finished and at least one failed
    #[serde(rename_all = "camelCase")]
    RunFailed {
        execution_id: String,
        failed: Vec<String>,
    },

    /// A process entered its step loop
    #[serde(rename_all = "camelCase")]
    ProcessStarted {
        process: String,
        execution_id: String,
    },

    /// A process reached `Complete`
    #[serde(rename_all = "camelCase")]
    ProcessCompleted {
        process: String,
        execution_id: String,
        steps: u64,
    },

    /// A process reached `Failed`
    #[serde(rename_all = "camelCase")]
    ProcessFailed {
        process: String,
        execution_id: String,
        error: String,
    },
}

/// A no-op event sink that discards all events
///
/// Useful when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into a tokio channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
