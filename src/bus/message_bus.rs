//! The run's message bus
//!
//! Publication is serialized so every subscriber sees one global order.
//! Handlers are looked up in a dispatch table keyed by [`MessageKind`];
//! all matching handlers run and their votes are ANDed. A `false` vote,
//! or the external cancellation predicate, only stops new work from being
//! requested.

use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::ledger::EntityLedger;
use super::sink::{MessageSink, MessageTransform};
use crate::models::{Message, MessageKind};

type CancelPredicate = dyn Fn() -> bool + Send + Sync;

pub struct MessageBus {
    table: RwLock<HashMap<MessageKind, Vec<Arc<dyn MessageSink>>>>,
    transforms: RwLock<Vec<Arc<dyn MessageTransform>>>,
    ledger: EntityLedger,
    publish_lock: ReentrantMutex<()>,
    stop_requested: AtomicBool,
    cancel: Option<Arc<CancelPredicate>>,
    completed: watch::Sender<bool>,
}

impl MessageBus {
    /// Empty bus: no subscribers, no transforms, nothing started
    pub fn new() -> Self {
        let (completed, _) = watch::channel(false);
        Self {
            table: RwLock::new(HashMap::new()),
            transforms: RwLock::new(Vec::new()),
            ledger: EntityLedger::new(),
            publish_lock: ReentrantMutex::new(()),
            stop_requested: AtomicBool::new(false),
            cancel: None,
            completed,
        }
    }

    /// External cancellation: when `predicate` returns true, stop requesting work
    pub fn with_cancellation(
        mut self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.cancel = Some(Arc::new(predicate));
        self
    }

    /// Register `sink` for one message kind
    pub fn subscribe(&self, kind: MessageKind, sink: Arc<dyn MessageSink>) {
        self.table.write().entry(kind).or_default().push(sink);
    }

    /// Register one `sink` for several kinds; it is called once per message
    pub fn subscribe_many(&self, kinds: &[MessageKind], sink: Arc<dyn MessageSink>) {
        let mut table = self.table.write();
        for kind in kinds {
            table.entry(*kind).or_default().push(sink.clone());
        }
    }

    /// Register `sink` for every message kind
    pub fn subscribe_all(&self, sink: Arc<dyn MessageSink>) {
        self.subscribe_many(&MessageKind::ALL, sink);
    }

    /// Add a rewrite stage applied before dispatch, in registration order
    pub fn add_transform(&self, transform: Arc<dyn MessageTransform>) {
        self.transforms.write().push(transform);
    }

    /// Publish `message`; returns whether the run should keep requesting work
    pub fn publish(&self, message: Message) -> bool {
        let _guard = self.publish_lock.lock();

        let message = self
            .transforms
            .read()
            .iter()
            .fold(message, |m, t| t.transform(m));

        if !self.ledger.admit(&message) {
            return self.keep_running();
        }

        let kind = message.kind();
        let handlers = self.table.read().get(&kind).cloned().unwrap_or_default();

        let mut keep_going = true;
        for handler in handlers {
            keep_going &= handler.on_message(&message);
        }

        if !keep_going && !self.stop_requested.swap(true, Ordering::SeqCst) {
            info!("Stop requested by a {:?} handler", kind);
        }

        if kind == MessageKind::AssemblyFinished {
            self.completed.send_if_modified(|done| !std::mem::replace(done, true));
            debug!("Assembly finished; completion latch set");
        }

        keep_going && self.keep_running()
    }

    /// False once any handler or the cancellation predicate asked to stop
    pub fn keep_running(&self) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        match &self.cancel {
            Some(cancelled) => !cancelled(),
            None => true,
        }
    }

    /// Ask the run to stop requesting work, as a `false` vote would
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            info!("Stop requested; no new work will be started");
        }
    }

    /// Whether `AssemblyFinished` has been published
    pub fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    /// Wait for the terminal `AssemblyFinished`
    pub async fn wait_for_completion(&self) {
        let mut rx = self.completed.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Entities with a Starting but no Finished yet
    pub fn open_entities(&self) -> usize {
        self.ledger.open_entities()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CollectingSink;
    use crate::models::{EntityLevel, EntityRef, RunSummary};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn assembly() -> EntityRef {
        EntityRef::new(EntityLevel::Assembly, "asm", "Assembly")
    }

    fn finished() -> Message {
        Message::AssemblyFinished {
            assembly: assembly(),
            summary: RunSummary::default(),
        }
    }

    fn starting() -> Message {
        Message::AssemblyStarting {
            assembly: assembly(),
            started_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = MessageBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = order.clone();
            bus.subscribe(
                MessageKind::Diagnostic,
                Arc::new(move |_: &Message| {
                    order.lock().push(id);
                    true
                }),
            );
        }

        assert!(bus.publish(Message::Diagnostic { text: "x".into() }));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_false_vote_stops_work_but_every_handler_still_sees_the_message() {
        let bus = MessageBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        bus.subscribe(MessageKind::Diagnostic, Arc::new(|_: &Message| false));
        let counter = seen.clone();
        bus.subscribe(
            MessageKind::Diagnostic,
            Arc::new(move |_: &Message| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
        );

        assert!(!bus.publish(Message::Diagnostic { text: "x".into() }));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!bus.keep_running());
    }

    #[test]
    fn test_no_subscribers_means_continue() {
        let bus = MessageBus::new();
        assert!(bus.publish(Message::Diagnostic { text: "x".into() }));
    }

    #[test]
    fn test_external_cancellation() {
        let flag = Arc::new(AtomicBool::new(false));
        let check = flag.clone();
        let bus = MessageBus::new().with_cancellation(move || check.load(Ordering::SeqCst));

        assert!(bus.keep_running());
        flag.store(true, Ordering::SeqCst);
        assert!(!bus.keep_running());
        assert!(!bus.publish(Message::Diagnostic { text: "x".into() }));
    }

    #[test]
    fn test_ledger_rejects_finish_before_start() {
        let bus = MessageBus::new();
        let sink = Arc::new(CollectingSink::new());
        bus.subscribe_all(sink.clone());

        bus.publish(finished());
        bus.publish(starting());
        bus.publish(finished());
        bus.publish(finished());

        let kinds: Vec<_> = sink.messages().iter().map(Message::kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::AssemblyStarting, MessageKind::AssemblyFinished]
        );
    }

    #[test]
    fn test_transforms_run_before_dispatch() {
        struct Shout;
        impl MessageTransform for Shout {
            fn transform(&self, message: Message) -> Message {
                match message {
                    Message::Diagnostic { text } => Message::Diagnostic {
                        text: text.to_uppercase(),
                    },
                    other => other,
                }
            }
        }

        let bus = MessageBus::new();
        let sink = Arc::new(CollectingSink::new());
        bus.subscribe(MessageKind::Diagnostic, sink.clone());
        bus.add_transform(Arc::new(Shout));

        bus.publish(Message::Diagnostic { text: "quiet".into() });
        assert_eq!(
            sink.messages()[0],
            Message::Diagnostic {
                text: "QUIET".into()
            }
        );
    }

    #[tokio::test]
    async fn test_completion_latch() {
        let bus = Arc::new(MessageBus::new());
        assert!(!bus.is_completed());

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_for_completion().await })
        };

        bus.publish(starting());
        bus.publish(finished());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("latch should release waiters")
            .unwrap();
        assert!(bus.is_completed());
    }

    #[test]
    fn test_concurrent_publication_keeps_pairs_ordered() {
        let bus = Arc::new(MessageBus::new());
        let sink = Arc::new(CollectingSink::new());
        bus.subscribe_all(sink.clone());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let method = EntityRef::new(EntityLevel::Method, format!("{t}-{i}"), "m");
                        bus.publish(Message::MethodStarting {
                            method: method.clone(),
                        });
                        bus.publish(Message::MethodFinished {
                            method,
                            summary: RunSummary::default(),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let messages = sink.messages();
        assert_eq!(messages.len(), 8 * 50 * 2);
        for message in &messages {
            if let Message::MethodFinished { method, .. } = message {
                let start = messages.iter().position(|m| {
                    matches!(m, Message::MethodStarting { method: s } if s == method)
                });
                let finish = messages.iter().position(|m| m == message);
                assert!(start.unwrap() < finish.unwrap());
            }
        }
        assert_eq!(bus.open_entities(), 0);
    }
}
