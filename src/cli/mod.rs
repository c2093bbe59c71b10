//! CLI argument parsing

use clap::{Parser, Subcommand};

/// Run scripted unit-test catalogs through the execution engine
#[derive(Parser, Debug)]
#[command(name = "suite-runner")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Unit-test execution engine with fixture lifecycles and a lifecycle message bus")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a catalog
    Run(RunArgs),

    /// List the cases in a catalog
    List(ListArgs),

    /// Print the supported environment variables
    Env,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Catalog file (YAML or JSON)
    pub catalog: String,

    /// Runner configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Maximum worker threads (0 = host parallelism, -1 = unbounded)
    #[arg(short = 't', long, allow_hyphen_values = true)]
    pub max_threads: Option<i32>,

    /// Run collections one after another
    #[arg(long)]
    pub sequential: bool,

    /// Report skipped tests as failures
    #[arg(long)]
    pub fail_skips: bool,

    /// Stop starting new tests after the first failure
    #[arg(long)]
    pub stop_on_fail: bool,

    /// Explicit tests: off, on, only
    #[arg(long)]
    pub explicit: Option<String>,

    /// Long-running test threshold in seconds
    #[arg(long)]
    pub long_running: Option<u64>,

    /// Print diagnostic messages
    #[arg(long)]
    pub diagnostics: bool,

    /// Seed for randomized ordering
    #[arg(long)]
    pub seed: Option<u64>,

    /// Summary format (table, json, json-pretty, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Save the summary to a file
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Catalog file (YAML or JSON)
    pub catalog: String,

    /// Show traits and skip reasons
    #[arg(short, long)]
    pub detailed: bool,
}
