//! Data models for the execution engine
//!
//! Entity descriptors, lifecycle messages, summaries and failure information.

mod entity;
mod failure;
mod message;
mod summary;

pub use entity::{
    CollectionDefinition, EntityLevel, EntityRef, SourceInfo, TestAssembly, TestBody, TestCase,
    TestClass, TestCollection, TestMethod, Traits,
};
pub use failure::{FailureFrame, FailureInfo, AGGREGATE_KIND, PANIC_KIND};
pub use message::{LongRunningTest, Message, MessageKind, Phase};
pub use summary::{ExecutionSummary, RunSummary};
