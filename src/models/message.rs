//! Lifecycle messages
//!
//! Everything the engine does is observable as a stream of these. Each
//! variant carries enough to be understood on its own; the bus routes on
//! [`MessageKind`] rather than inspecting payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::entity::{EntityLevel, EntityRef, SourceInfo, Traits};
use super::failure::FailureInfo;
use super::summary::RunSummary;

/// Explicit discriminator used for the bus dispatch table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    AssemblyStarting,
    AssemblyFinished,
    AssemblyCleanupFailure,
    CollectionStarting,
    CollectionFinished,
    CollectionCleanupFailure,
    ClassStarting,
    ClassFinished,
    ClassCleanupFailure,
    MethodStarting,
    MethodFinished,
    MethodCleanupFailure,
    CaseStarting,
    CaseFinished,
    CaseCleanupFailure,
    TestStarting,
    TestPassed,
    TestFailed,
    TestSkipped,
    TestNotRun,
    TestFinished,
    TestOutput,
    TestCleanupFailure,
    Error,
    Diagnostic,
    LongRunningTests,
}

impl MessageKind {
    pub const ALL: [MessageKind; 26] = [
        MessageKind::AssemblyStarting,
        MessageKind::AssemblyFinished,
        MessageKind::AssemblyCleanupFailure,
        MessageKind::CollectionStarting,
        MessageKind::CollectionFinished,
        MessageKind::CollectionCleanupFailure,
        MessageKind::ClassStarting,
        MessageKind::ClassFinished,
        MessageKind::ClassCleanupFailure,
        MessageKind::MethodStarting,
        MessageKind::MethodFinished,
        MessageKind::MethodCleanupFailure,
        MessageKind::CaseStarting,
        MessageKind::CaseFinished,
        MessageKind::CaseCleanupFailure,
        MessageKind::TestStarting,
        MessageKind::TestPassed,
        MessageKind::TestFailed,
        MessageKind::TestSkipped,
        MessageKind::TestNotRun,
        MessageKind::TestFinished,
        MessageKind::TestOutput,
        MessageKind::TestCleanupFailure,
        MessageKind::Error,
        MessageKind::Diagnostic,
        MessageKind::LongRunningTests,
    ];

    /// Kinds that count towards the summary's error counter
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MessageKind::Error
                | MessageKind::AssemblyCleanupFailure
                | MessageKind::CollectionCleanupFailure
                | MessageKind::ClassCleanupFailure
                | MessageKind::MethodCleanupFailure
                | MessageKind::CaseCleanupFailure
                | MessageKind::TestCleanupFailure
        )
    }

    fn cleanup_failure(level: EntityLevel) -> Self {
        match level {
            EntityLevel::Assembly => MessageKind::AssemblyCleanupFailure,
            EntityLevel::Collection => MessageKind::CollectionCleanupFailure,
            EntityLevel::Class => MessageKind::ClassCleanupFailure,
            EntityLevel::Method => MessageKind::MethodCleanupFailure,
            EntityLevel::Case => MessageKind::CaseCleanupFailure,
            EntityLevel::Test => MessageKind::TestCleanupFailure,
        }
    }
}

/// Where a message sits in an entity's lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Finished,
}

/// One test that has been running past the threshold
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongRunningTest {
    pub case: EntityRef,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    AssemblyStarting {
        assembly: EntityRef,
        started_at: DateTime<Utc>,
    },
    AssemblyFinished {
        assembly: EntityRef,
        summary: RunSummary,
    },
    CollectionStarting {
        collection: EntityRef,
    },
    CollectionFinished {
        collection: EntityRef,
        summary: RunSummary,
    },
    ClassStarting {
        class: EntityRef,
    },
    ClassFinished {
        class: EntityRef,
        summary: RunSummary,
    },
    MethodStarting {
        method: EntityRef,
    },
    MethodFinished {
        method: EntityRef,
        summary: RunSummary,
    },
    CaseStarting {
        case: EntityRef,
        traits: Traits,
        source: Option<SourceInfo>,
    },
    CaseFinished {
        case: EntityRef,
        summary: RunSummary,
    },
    TestStarting {
        test: EntityRef,
    },
    TestPassed {
        test: EntityRef,
        execution_time: Duration,
        output: String,
    },
    TestFailed {
        test: EntityRef,
        execution_time: Duration,
        output: String,
        failure: FailureInfo,
    },
    TestSkipped {
        test: EntityRef,
        reason: String,
    },
    TestNotRun {
        test: EntityRef,
    },
    TestFinished {
        test: EntityRef,
        execution_time: Duration,
        output: String,
    },
    TestOutput {
        test: EntityRef,
        text: String,
    },
    /// Teardown failure for any level; the level picks the kind
    CleanupFailure {
        entity: EntityRef,
        failure: FailureInfo,
    },
    /// Failure not attributable to a single test
    Error {
        failure: FailureInfo,
    },
    Diagnostic {
        text: String,
    },
    LongRunningTests {
        threshold: Duration,
        tests: Vec<LongRunningTest>,
    },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::AssemblyStarting { .. } => MessageKind::AssemblyStarting,
            Message::AssemblyFinished { .. } => MessageKind::AssemblyFinished,
            Message::CollectionStarting { .. } => MessageKind::CollectionStarting,
            Message::CollectionFinished { .. } => MessageKind::CollectionFinished,
            Message::ClassStarting { .. } => MessageKind::ClassStarting,
            Message::ClassFinished { .. } => MessageKind::ClassFinished,
            Message::MethodStarting { .. } => MessageKind::MethodStarting,
            Message::MethodFinished { .. } => MessageKind::MethodFinished,
            Message::CaseStarting { .. } => MessageKind::CaseStarting,
            Message::CaseFinished { .. } => MessageKind::CaseFinished,
            Message::TestStarting { .. } => MessageKind::TestStarting,
            Message::TestPassed { .. } => MessageKind::TestPassed,
            Message::TestFailed { .. } => MessageKind::TestFailed,
            Message::TestSkipped { .. } => MessageKind::TestSkipped,
            Message::TestNotRun { .. } => MessageKind::TestNotRun,
            Message::TestFinished { .. } => MessageKind::TestFinished,
            Message::TestOutput { .. } => MessageKind::TestOutput,
            Message::CleanupFailure { entity, .. } => MessageKind::cleanup_failure(entity.level),
            Message::Error { .. } => MessageKind::Error,
            Message::Diagnostic { .. } => MessageKind::Diagnostic,
            Message::LongRunningTests { .. } => MessageKind::LongRunningTests,
        }
    }

    /// The entity this message is about, if any
    pub fn entity(&self) -> Option<&EntityRef> {
        match self {
            Message::AssemblyStarting { assembly, .. }
            | Message::AssemblyFinished { assembly, .. } => Some(assembly),
            Message::CollectionStarting { collection }
            | Message::CollectionFinished { collection, .. } => Some(collection),
            Message::ClassStarting { class } | Message::ClassFinished { class, .. } => Some(class),
            Message::MethodStarting { method } | Message::MethodFinished { method, .. } => {
                Some(method)
            }
            Message::CaseStarting { case, .. } | Message::CaseFinished { case, .. } => Some(case),
            Message::TestStarting { test }
            | Message::TestPassed { test, .. }
            | Message::TestFailed { test, .. }
            | Message::TestSkipped { test, .. }
            | Message::TestNotRun { test }
            | Message::TestFinished { test, .. }
            | Message::TestOutput { test, .. } => Some(test),
            Message::CleanupFailure { entity, .. } => Some(entity),
            Message::Error { .. } | Message::Diagnostic { .. } | Message::LongRunningTests { .. } => {
                None
            }
        }
    }

    /// Lifecycle phase for Starting/Finished pairs tracked by the bus
    pub fn phase(&self) -> Option<Phase> {
        match self.kind() {
            MessageKind::AssemblyStarting
            | MessageKind::CollectionStarting
            | MessageKind::ClassStarting
            | MessageKind::MethodStarting
            | MessageKind::CaseStarting
            | MessageKind::TestStarting => Some(Phase::Starting),
            MessageKind::AssemblyFinished
            | MessageKind::CollectionFinished
            | MessageKind::ClassFinished
            | MessageKind::MethodFinished
            | MessageKind::CaseFinished
            | MessageKind::TestFinished => Some(Phase::Finished),
            _ => None,
        }
    }

    /// Summary carried by a `*Finished` message
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Message::AssemblyFinished { summary, .. }
            | Message::CollectionFinished { summary, .. }
            | Message::ClassFinished { summary, .. }
            | Message::MethodFinished { summary, .. }
            | Message::CaseFinished { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn summary_mut(&mut self) -> Option<&mut RunSummary> {
        match self {
            Message::AssemblyFinished { summary, .. }
            | Message::CollectionFinished { summary, .. }
            | Message::ClassFinished { summary, .. }
            | Message::MethodFinished { summary, .. }
            | Message::CaseFinished { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match self {
            Message::TestFailed { failure, .. }
            | Message::CleanupFailure { failure, .. }
            | Message::Error { failure } => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.entity(), self) {
            (_, Message::Diagnostic { text }) => write!(f, "{:?}: {}", self.kind(), text),
            (_, Message::Error { failure }) => write!(f, "Error: {}", failure.message()),
            (_, Message::LongRunningTests { tests, .. }) => {
                write!(f, "LongRunningTests: {} test(s)", tests.len())
            }
            (Some(entity), _) => write!(f, "{:?}: {}", self.kind(), entity.display_name),
            (None, _) => write!(f, "{:?}", self.kind()),
        }
    }
}
