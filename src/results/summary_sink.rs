//! Execution summary aggregation

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::bus::{MessageBus, MessageSink};
use crate::models::{ExecutionSummary, Message};

/// Counts errors and captures the final summary on `AssemblyFinished`
#[derive(Default)]
pub struct ExecutionSummarySink {
    errors: AtomicU32,
    summary: Mutex<Option<ExecutionSummary>>,
}

impl ExecutionSummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every message kind on `bus`
    pub fn attach(bus: &MessageBus) -> Arc<Self> {
        let sink = Arc::new(Self::new());
        bus.subscribe_all(sink.clone());
        sink
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::SeqCst)
    }

    /// The final summary, once the assembly has finished
    pub fn summary(&self) -> Option<ExecutionSummary> {
        self.summary.lock().clone()
    }
}

impl MessageSink for ExecutionSummarySink {
    fn on_message(&self, message: &Message) -> bool {
        if message.kind().is_error() {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        if let Message::AssemblyFinished { summary, .. } = message {
            let summary = ExecutionSummary::from_run(*summary, self.errors());
            debug!("Execution summary recorded: {}", summary);
            *self.summary.lock() = Some(summary);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityLevel, EntityRef, FailureInfo, RunSummary};

    #[test]
    fn test_counts_errors_and_cleanup_failures() {
        let bus = MessageBus::new();
        let sink = ExecutionSummarySink::attach(&bus);
        let assembly = EntityRef::new(EntityLevel::Assembly, "asm", "Assembly");
        let class = EntityRef::new(EntityLevel::Class, "c", "Class");

        bus.publish(Message::AssemblyStarting {
            assembly: assembly.clone(),
            started_at: chrono::Utc::now(),
        });
        bus.publish(Message::Error {
            failure: FailureInfo::new("error", "setup failed"),
        });
        bus.publish(Message::CleanupFailure {
            entity: class,
            failure: FailureInfo::new("error", "dispose failed"),
        });
        bus.publish(Message::Diagnostic {
            text: "not an error".into(),
        });
        assert!(sink.summary().is_none());

        bus.publish(Message::AssemblyFinished {
            assembly,
            summary: RunSummary {
                total: 3,
                failed: 1,
                skipped: 1,
                ..RunSummary::default()
            },
        });

        let summary = sink.summary().unwrap();
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed(), 1);
    }
}
