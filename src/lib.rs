//! suite-runner: a unit-test execution engine
//!
//! Runs a hierarchy of assembly, collections, classes, methods and cases,
//! sharing fixtures per scope and reporting every lifecycle step on a
//! [`bus::MessageBus`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use suite_runner::bus::MessageBus;
//! use suite_runner::executor::AssemblyRunner;
//! use suite_runner::models::{TestAssembly, TestBody, TestCase, TestClass, TestCollection, TestMethod};
//! use suite_runner::results::ExecutionSummarySink;
//!
//! # async fn run() {
//! let collection = Arc::new(TestCollection::new("math", "Math"));
//! let class = Arc::new(TestClass::new("math::adder", "Adder", collection));
//! let method = Arc::new(TestMethod::new("math::adder.adds", "Adder.adds", class));
//! let case = TestCase::new("adds#0", "adds", method, TestBody::sync(|_| Ok(())));
//!
//! let bus = Arc::new(MessageBus::new());
//! let summary = ExecutionSummarySink::attach(&bus);
//! AssemblyRunner::new(TestAssembly::new("asm", "Example"), vec![case], bus)
//!     .run()
//!     .await;
//! println!("{:?}", summary.summary());
//! # }
//! ```

pub mod bus;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod fixture;
pub mod models;
pub mod output;
pub mod results;
pub mod utils;
