//! Message sinks
//!
//! Anything that wants to observe the run implements [`MessageSink`]. The
//! return value is the sink's vote on whether the run should keep
//! requesting new work.

use parking_lot::Mutex;
use std::sync::Weak;
use tokio::sync::mpsc;
use tracing::debug;

use super::MessageBus;
use crate::models::{Message, MessageKind};

pub trait MessageSink: Send + Sync {
    fn on_message(&self, message: &Message) -> bool;
}

impl<F> MessageSink for F
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn on_message(&self, message: &Message) -> bool {
        self(message)
    }
}

/// Rewrites messages before they are dispatched
pub trait MessageTransform: Send + Sync {
    fn transform(&self, message: Message) -> Message;
}

/// Forwards every message into a tokio channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelSink {
    /// Sink plus the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn on_message(&self, message: &Message) -> bool {
        if self.tx.send(message.clone()).is_err() {
            debug!("Channel sink receiver dropped; discarding {:?}", message.kind());
        }
        true
    }
}

/// Keeps every message in memory, in publication order
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<Message>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn of_kind(&self, kind: MessageKind) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of messages of `kind` received so far
    pub fn count(&self, kind: MessageKind) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.kind() == kind)
            .count()
    }

    /// Position of the first message matching `pred`
    pub fn position(&self, pred: impl Fn(&Message) -> bool) -> Option<usize> {
        self.messages.lock().iter().position(pred)
    }
}

impl MessageSink for CollectingSink {
    fn on_message(&self, message: &Message) -> bool {
        self.messages.lock().push(message.clone());
        true
    }
}

/// Well-known injectable: lets fixtures and runners emit diagnostics
#[derive(Clone)]
pub struct DiagnosticSink {
    bus: Option<Weak<MessageBus>>,
}

impl DiagnosticSink {
    pub fn new(bus: Weak<MessageBus>) -> Self {
        Self { bus: Some(bus) }
    }

    /// Sink that drops everything (diagnostics turned off)
    pub fn disabled() -> Self {
        Self { bus: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    /// Publish `text` as a `Diagnostic`; a no-op once the bus is gone
    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        debug!("diagnostic: {}", text);
        if let Some(bus) = self.bus.as_ref().and_then(Weak::upgrade) {
            bus.publish(Message::Diagnostic { text });
        }
    }
}

impl std::fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
