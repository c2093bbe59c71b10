//! Environment variable overrides
//!
//! Every `RunConfig` knob can be overridden with a `SUITE_RUNNER_*` variable.

use std::env;

use crate::executor::ExplicitOption;

const ENV_PREFIX: &str = "SUITE_RUNNER";

#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// SUITE_RUNNER_MAX_THREADS
    pub max_parallel_threads: Option<i32>,
    /// SUITE_RUNNER_PARALLEL
    pub parallelize: Option<bool>,
    /// SUITE_RUNNER_LONG_RUNNING
    pub long_running_seconds: Option<u64>,
    /// SUITE_RUNNER_FAIL_SKIPS
    pub fail_skips: Option<bool>,
    /// SUITE_RUNNER_STOP_ON_FAIL
    pub stop_on_fail: Option<bool>,
    /// SUITE_RUNNER_EXPLICIT
    pub explicit: Option<ExplicitOption>,
    /// SUITE_RUNNER_DIAGNOSTICS
    pub diagnostic_messages: Option<bool>,
    /// SUITE_RUNNER_SEED
    pub seed: Option<u64>,
    /// SUITE_RUNNER_CONFIG
    pub config_file: Option<String>,
    /// SUITE_RUNNER_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self {
            max_parallel_threads: get_env_parse("MAX_THREADS"),
            parallelize: get_env_bool("PARALLEL"),
            long_running_seconds: get_env_parse("LONG_RUNNING"),
            fail_skips: get_env_bool("FAIL_SKIPS"),
            stop_on_fail: get_env_bool("STOP_ON_FAIL"),
            explicit: get_env_parse("EXPLICIT"),
            diagnostic_messages: get_env_bool("DIAGNOSTICS"),
            seed: get_env_parse("SEED"),
            config_file: get_env("CONFIG"),
            format: get_env("FORMAT"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.max_parallel_threads.is_some()
            || self.parallelize.is_some()
            || self.long_running_seconds.is_some()
            || self.fail_skips.is_some()
            || self.stop_on_fail.is_some()
            || self.explicit.is_some()
            || self.diagnostic_messages.is_some()
            || self.seed.is_some()
            || self.config_file.is_some()
            || self.format.is_some()
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_MAX_THREADS    Worker threads (0 = host parallelism, -1 = unbounded)");
    println!("  {ENV_PREFIX}_PARALLEL       Run collections in parallel (true/false)");
    println!("  {ENV_PREFIX}_LONG_RUNNING   Long-running test threshold in seconds");
    println!("  {ENV_PREFIX}_FAIL_SKIPS     Report skipped tests as failures");
    println!("  {ENV_PREFIX}_STOP_ON_FAIL   Stop starting new tests after a failure");
    println!("  {ENV_PREFIX}_EXPLICIT       Explicit tests: off, on, only");
    println!("  {ENV_PREFIX}_DIAGNOSTICS    Print diagnostic messages");
    println!("  {ENV_PREFIX}_SEED           Seed for randomized ordering");
    println!("  {ENV_PREFIX}_CONFIG         Path to configuration file");
    println!("  {ENV_PREFIX}_FORMAT         Summary format (table, json, json-pretty, summary)");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the guard's lifetime and restores them on drop
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(name, value)| {
                    let key = format!("{ENV_PREFIX}_{name}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_load() {
        let _guard = EnvGuard::set(&[
            ("MAX_THREADS", "-1"),
            ("FAIL_SKIPS", "yes"),
            ("EXPLICIT", "on"),
            ("SEED", "not-a-number"),
        ]);

        let config = EnvConfig::load();
        assert_eq!(config.max_parallel_threads, Some(-1));
        assert_eq!(config.fail_skips, Some(true));
        assert_eq!(config.explicit, Some(ExplicitOption::On));
        assert_eq!(config.seed, None);
        assert!(config.has_any());
    }
}
