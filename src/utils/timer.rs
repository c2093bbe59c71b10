//! Timing helpers

use std::time::{Duration, Instant};

/// Wall-clock timer for one entity's run
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer, logging the elapsed time at trace level
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::trace!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Render a duration the way reporters print it: `850ms`, `1.234s`, `2m 05s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.3}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
