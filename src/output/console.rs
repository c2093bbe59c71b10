//! Console reporter
//!
//! A bus sink that prints one line per finished test, plus errors,
//! cleanup failures, long-running notices and (optionally) diagnostics.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

use super::formatter::{ResultFormatter, TestStatus};
use crate::bus::{MessageBus, MessageSink};
use crate::models::{FailureInfo, Message, MessageKind};
use crate::utils::format_duration;

pub struct ConsoleReporter {
    formatter: ResultFormatter,
    diagnostics: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    pub fn new(formatter: ResultFormatter) -> Self {
        Self::with_writer(formatter, Box::new(io::stdout()))
    }

    pub fn with_writer(formatter: ResultFormatter, out: Box<dyn Write + Send>) -> Self {
        Self {
            formatter,
            diagnostics: false,
            out: Mutex::new(out),
        }
    }

    /// Also print `Diagnostic` messages
    pub fn show_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn attach(self, bus: &MessageBus) -> Arc<Self> {
        let mut kinds = vec![
            MessageKind::AssemblyStarting,
            MessageKind::TestPassed,
            MessageKind::TestFailed,
            MessageKind::TestSkipped,
            MessageKind::TestNotRun,
            MessageKind::LongRunningTests,
        ];
        kinds.extend(MessageKind::ALL.iter().copied().filter(MessageKind::is_error));
        if self.diagnostics {
            kinds.push(MessageKind::Diagnostic);
        }

        let reporter = Arc::new(self);
        bus.subscribe_many(&kinds, reporter.clone());
        reporter
    }

    fn write_lines(&self, lines: &[String]) {
        let mut out = self.out.lock();
        for line in lines {
            // Console output is best effort; a closed stdout must not stop the run
            let _ = writeln!(out, "{}", line);
        }
        let _ = out.flush();
    }

    fn failure_lines(failure: &FailureInfo, indent: &str) -> Vec<String> {
        failure
            .frames
            .iter()
            .map(|frame| format!("{indent}{}: {}", frame.kind, frame.message))
            .collect()
    }

    fn render(&self, message: &Message) -> Vec<String> {
        match message {
            Message::AssemblyStarting { assembly, .. } => {
                vec![format!("Running {}", assembly.display_name)]
            }
            Message::TestPassed {
                test,
                execution_time,
                ..
            } => vec![self
                .formatter
                .format_test(TestStatus::Pass, &test.display_name, *execution_time)],
            Message::TestFailed {
                test,
                execution_time,
                output,
                failure,
            } => {
                let mut lines = vec![self.formatter.format_test(
                    TestStatus::Fail,
                    &test.display_name,
                    *execution_time,
                )];
                lines.extend(Self::failure_lines(failure, "      "));
                if !output.is_empty() {
                    lines.push("      Output:".to_string());
                    lines.extend(output.lines().map(|l| format!("        {l}")));
                }
                lines
            }
            Message::TestSkipped { test, reason } => vec![format!(
                "{} ({})",
                self.formatter
                    .format_test(TestStatus::Skip, &test.display_name, Default::default()),
                reason
            )],
            Message::TestNotRun { test } => vec![self.formatter.format_test(
                TestStatus::NotRun,
                &test.display_name,
                Default::default(),
            )],
            Message::Error { failure } => {
                let mut lines = vec!["[ERROR]".to_string()];
                lines.extend(Self::failure_lines(failure, "  "));
                lines
            }
            Message::CleanupFailure { entity, failure } => {
                let mut lines = vec![format!("[CLEANUP] {}", entity)];
                lines.extend(Self::failure_lines(failure, "  "));
                lines
            }
            Message::LongRunningTests { threshold, tests } => {
                let mut lines = vec![format!(
                    "[LONG RUNNING] {} test(s) over {}",
                    tests.len(),
                    format_duration(*threshold)
                )];
                lines.extend(tests.iter().map(|t| {
                    format!("  {} ({})", t.case.display_name, format_duration(t.elapsed))
                }));
                lines
            }
            Message::Diagnostic { text } if self.diagnostics => vec![format!("[DIAG] {text}")],
            _ => Vec::new(),
        }
    }
}

impl MessageSink for ConsoleReporter {
    fn on_message(&self, message: &Message) -> bool {
        let lines = self.render(message);
        if !lines.is_empty() {
            self.write_lines(&lines);
        }
        true
    }
}
