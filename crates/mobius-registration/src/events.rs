//! Line events emitted by the registration engine.
//!
//! The engine owns the sending half of an unbounded channel; the line owner
//! holds the receiver returned by [`Registration::new`](crate::Registration::new)
//! and sees events in emission order.

use crate::errors::LineError;
use crate::models::DeviceInfo;
use tokio::sync::mpsc;
use tracing::debug;

/// Registration lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// About to contact a Mobius server.
    Connecting,
    /// Bound to a server.
    Registered(Box<DeviceInfo>),
    /// No longer bound to any server.
    Unregistered,
    /// A keepalive failed; still inside the retry budget.
    Reconnecting,
    /// A keepalive succeeded after one or more failures.
    Reconnected,
    /// Final failure; no automatic retry follows.
    Error(LineError),
}

impl LineEvent {
    /// Event name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            LineEvent::Connecting => "connecting",
            LineEvent::Registered(_) => "registered",
            LineEvent::Unregistered => "unregistered",
            LineEvent::Reconnecting => "reconnecting",
            LineEvent::Reconnected => "reconnected",
            LineEvent::Error(_) => "error",
        }
    }
}

/// Sending half used inside the engine.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: mpsc::UnboundedSender<LineEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<LineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Deliver an event. A dropped receiver is not an error for the engine.
    pub(crate) fn emit(&self, event: LineEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!(target: "mobius.registration", event = name, "Line event receiver dropped");
        }
    }
}
