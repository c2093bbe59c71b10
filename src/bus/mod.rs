//! Message bus
//!
//! Typed publish/subscribe for lifecycle events. The bus is the terminal
//! sink for everything the engine does; reporters and aggregators hang off
//! it as [`MessageSink`]s.

mod ledger;
mod message_bus;
mod sink;

pub use ledger::EntityLedger;
pub use message_bus::MessageBus;
pub use sink::{ChannelSink, CollectingSink, DiagnosticSink, MessageSink, MessageTransform};
