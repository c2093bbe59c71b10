//! Run configuration
//!
//! Loads the runner's knobs from YAML or JSON; the file extension picks
//! the format.

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dispatch::Concurrency;
use crate::executor::{ExplicitOption, RunOptions};

pub use env::EnvConfig;

/// Runner configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 0 uses the host's parallelism, -1 is unbounded
    pub max_parallel_threads: i32,

    /// Run collections in parallel
    pub parallelize_test_collections: bool,

    /// Long-running test threshold in seconds; 0 disables the watchdog
    pub long_running_seconds: u64,

    /// Report skipped tests as failures
    pub fail_skips: bool,

    /// Stop requesting new work after the first failure
    pub stop_on_fail: bool,

    pub explicit: ExplicitOption,

    /// Print diagnostic messages to the console
    pub diagnostic_messages: bool,

    /// Seed for the orderer fallback shuffle
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_parallel_threads: 0,
            parallelize_test_collections: true,
            long_running_seconds: 0,
            fail_skips: false,
            stop_on_fail: false,
            explicit: ExplicitOption::Off,
            diagnostic_messages: false,
            seed: None,
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

impl RunConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Overlay any `SUITE_RUNNER_*` values that are set
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(threads) = env.max_parallel_threads {
            self.max_parallel_threads = threads;
        }
        if let Some(parallel) = env.parallelize {
            self.parallelize_test_collections = parallel;
        }
        if let Some(seconds) = env.long_running_seconds {
            self.long_running_seconds = seconds;
        }
        if let Some(fail_skips) = env.fail_skips {
            self.fail_skips = fail_skips;
        }
        if let Some(stop) = env.stop_on_fail {
            self.stop_on_fail = stop;
        }
        if let Some(explicit) = env.explicit {
            self.explicit = explicit;
        }
        if let Some(diagnostics) = env.diagnostic_messages {
            self.diagnostic_messages = diagnostics;
        }
        if let Some(seed) = env.seed {
            self.seed = Some(seed);
        }
    }

    pub fn long_running_threshold(&self) -> Option<Duration> {
        (self.long_running_seconds > 0).then(|| Duration::from_secs(self.long_running_seconds))
    }

    pub fn to_run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: Concurrency::from_max_threads(self.max_parallel_threads),
            parallelize_collections: self.parallelize_test_collections,
            explicit: self.explicit,
            stop_on_fail: self.stop_on_fail,
            seed: self.seed,
        }
    }
}
