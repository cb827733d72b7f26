// src/progress/mod.rs

//! Progress events flowing from the pipeline to observers.
//!
//! Publishing is fire-and-forget: a sink never blocks the pipeline and never
//! reports delivery failures back to it. Events of one run arrive in the
//! order they were published. Nothing is buffered for observers that attach
//! later.

pub mod heartbeat;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

pub use heartbeat::Heartbeat;

/// One event sent to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Connection handshake; the observer is asked to acknowledge it.
    Connected,
    /// Human-readable progress line.
    Message(String),
    /// The provisioned application is reachable at `url`.
    Launch { url: String },
    /// Periodic liveness signal.
    KeepAlive { chr: char },
    /// Terminal event of a submission, emitted exactly once.
    Done,
}

impl ProgressEvent {
    pub fn message(text: impl Into<String>) -> Self {
        ProgressEvent::Message(text.into())
    }
}

/// Destination for progress events.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Sink feeding one connected observer's outbound queue.
#[derive(Debug, Clone)]
pub struct ObserverSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ObserverSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ObserverSink {
    fn publish(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            trace!("observer gone; dropping progress event");
        }
    }
}

/// Publishes [`ProgressEvent::Done`] when dropped.
///
/// Create one at the start of a submission; every way out of that scope,
/// including early returns and errors, ends with exactly one `Done`.
pub struct TerminalGuard {
    sink: Arc<dyn ProgressSink>,
}

impl TerminalGuard {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.sink.publish(ProgressEvent::Done);
    }
}
