//! Summary and per-test line formatting

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::models::ExecutionSummary;
use crate::utils::format_duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// How a single test ended, as the console shows it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    NotRun,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
            TestStatus::NotRun => "-",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Skip => "SKIP",
            TestStatus::NotRun => "NOT RUN",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            TestStatus::Pass => "\x1b[32m",
            TestStatus::Fail => "\x1b[31m",
            TestStatus::Skip => "\x1b[33m",
            TestStatus::NotRun => "\x1b[90m",
        }
    }
}

#[derive(Serialize)]
struct SummaryJson {
    total: u32,
    passed: u32,
    failed: u32,
    skipped: u32,
    not_run: u32,
    errors: u32,
    pass_rate: f64,
    time_ms: u128,
    success: bool,
}

impl From<&ExecutionSummary> for SummaryJson {
    fn from(summary: &ExecutionSummary) -> Self {
        Self {
            total: summary.total,
            passed: summary.passed(),
            failed: summary.failed,
            skipped: summary.skipped,
            not_run: summary.not_run,
            errors: summary.errors,
            pass_rate: summary.pass_rate(),
            time_ms: summary.time.as_millis(),
            success: summary.is_success(),
        }
    }
}

pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colorize {
            format!("{color}{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// One console line for a finished test
    pub fn format_test(&self, status: TestStatus, name: &str, time: Duration) -> String {
        let badge = format!("{} {}", status.symbol(), status.label());
        format!(
            "  {} {} [{}]",
            self.paint(status.color(), &badge),
            name,
            format_duration(time)
        )
    }

    pub fn format_summary(&self, assembly: &str, summary: &ExecutionSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(assembly, summary),
            OutputFormat::Json => {
                serde_json::to_string(&SummaryJson::from(summary)).unwrap_or_default()
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(&SummaryJson::from(summary)).unwrap_or_default()
            }
            OutputFormat::Summary => self.format_summary_brief(assembly, summary),
        }
    }

    fn format_summary_table(&self, assembly: &str, summary: &ExecutionSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  {:58}  ║\n", assembly));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = self.paint("\x1b[32m", &format!("{:3}", summary.passed()));
        let fail_str = if summary.failed > 0 {
            self.paint("\x1b[31m", &format!("{:3}", summary.failed))
        } else {
            format!("{:3}", summary.failed)
        };
        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Skip: {:3} | Not run: {:3} ║\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.not_run
        ));
        output.push_str(&format!(
            "║  Errors: {:3} | Pass Rate: {:5.1}% | Duration: {:>12}      ║\n",
            summary.errors,
            summary.pass_rate(),
            format_duration(summary.time)
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_summary_brief(&self, assembly: &str, summary: &ExecutionSummary) -> String {
        format!(
            "{}: {}/{} passed ({:.1}%), {} failed, {} skipped, {} errors in {}",
            assembly,
            summary.passed(),
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.skipped,
            summary.errors,
            format_duration(summary.time)
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write the summary to `path` without color codes
pub fn write_summary_to_file(
    path: impl AsRef<Path>,
    assembly: &str,
    summary: &ExecutionSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let content = ResultFormatter::new(format)
        .no_color()
        .format_summary(assembly, summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
