//! Result aggregation
//!
//! Bus-side consumers of the run: the execution summary, the fail-skips
//! rewrite and the long-running test watchdog.

mod fail_skips;
mod summary_sink;
mod watchdog;

pub use fail_skips::{FailSkips, FAIL_SKIP_KIND};
pub use summary_sink::ExecutionSummarySink;
pub use watchdog::LongRunningWatchdog;
