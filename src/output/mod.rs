//! Console and summary output

mod console;
mod formatter;

pub use console::ConsoleReporter;
pub use formatter::{write_summary_to_file, OutputFormat, ResultFormatter, TestStatus};
