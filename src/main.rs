//! suite-runner - run scripted unit-test catalogs
//!
//! ## Usage
//!
//! ```bash
//! # Run a catalog with the default configuration
//! suite-runner run catalog.yaml
//!
//! # Two workers, skipped tests count as failures, JSON summary
//! suite-runner run catalog.yaml --max-threads 2 --fail-skips --format json
//!
//! # Warn about tests running longer than 30 seconds
//! suite-runner run catalog.yaml --long-running 30
//!
//! # List the cases in a catalog
//! suite-runner list catalog.yaml --detailed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use suite_runner::bus::MessageBus;
use suite_runner::catalog::ScriptedCatalog;
use suite_runner::cli::{self, Args};
use suite_runner::config::env::print_env_help;
use suite_runner::config::{EnvConfig, RunConfig};
use suite_runner::executor::{AssemblyRunner, ExplicitOption};
use suite_runner::models::ExecutionSummary;
use suite_runner::output::{write_summary_to_file, ConsoleReporter, OutputFormat, ResultFormatter};
use suite_runner::results::{ExecutionSummarySink, FailSkips, LongRunningWatchdog};
use suite_runner::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        args.log_level.parse().unwrap_or_default()
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let summary = run_catalog(run_args).await?;
            if !summary.is_success() {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_cases(list_args)?;
        }
        cli::Command::Env => {
            print_env_help();
        }
    }

    Ok(())
}

/// File config, then `SUITE_RUNNER_*`, then command-line flags
fn load_config(args: &cli::RunArgs, env: &EnvConfig) -> Result<RunConfig> {
    let path = args.config.clone().or_else(|| env.config_file.clone());
    let mut config = match path {
        Some(path) => RunConfig::load(&path)?,
        None => RunConfig::default(),
    };
    config.apply_env(env);

    if let Some(threads) = args.max_threads {
        config.max_parallel_threads = threads;
    }
    if args.sequential {
        config.parallelize_test_collections = false;
    }
    if args.fail_skips {
        config.fail_skips = true;
    }
    if args.stop_on_fail {
        config.stop_on_fail = true;
    }
    if let Some(explicit) = &args.explicit {
        config.explicit = explicit
            .parse::<ExplicitOption>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(seconds) = args.long_running {
        config.long_running_seconds = seconds;
    }
    if args.diagnostics {
        config.diagnostic_messages = true;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    Ok(config)
}

async fn run_catalog(args: cli::RunArgs) -> Result<ExecutionSummary> {
    let env = EnvConfig::load();
    let config = load_config(&args, &env)?;

    let format = match args.format.as_ref().or(env.format.as_ref()) {
        Some(format) => format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?,
        None => OutputFormat::Table,
    };
    let formatter = |format: OutputFormat| {
        let formatter = ResultFormatter::new(format);
        if args.no_color {
            formatter.no_color()
        } else {
            formatter
        }
    };

    let catalog = ScriptedCatalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog))?;
    let (assembly, cases) = catalog.build().context("Invalid catalog")?;
    let assembly_name = assembly.display_name.clone();

    let bus = Arc::new(MessageBus::new());
    if config.fail_skips {
        bus.add_transform(Arc::new(FailSkips));
    }
    let summary_sink = ExecutionSummarySink::attach(&bus);
    if let Some(threshold) = config.long_running_threshold() {
        LongRunningWatchdog::attach(&bus, threshold);
    }
    ConsoleReporter::new(formatter(OutputFormat::Table))
        .show_diagnostics(config.diagnostic_messages)
        .attach(&bus);

    let stop_bus = Arc::downgrade(&bus);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing running tests");
            if let Some(bus) = stop_bus.upgrade() {
                bus.request_stop();
            }
        }
    });

    info!(
        "Running {} ({} cases, max threads {})",
        assembly_name,
        cases.len(),
        config.max_parallel_threads
    );
    let run_summary = AssemblyRunner::new(assembly, cases, bus.clone())
        .with_options(config.to_run_options())
        .run()
        .await;
    ctrl_c.abort();

    if tokio::time::timeout(Duration::from_secs(5), bus.wait_for_completion())
        .await
        .is_err()
    {
        warn!("Run did not report completion");
    }

    let summary = summary_sink
        .summary()
        .unwrap_or_else(|| ExecutionSummary::from_run(run_summary, summary_sink.errors()));

    println!("{}", formatter(format).format_summary(&assembly_name, &summary));

    if let Some(path) = &args.output {
        write_summary_to_file(path, &assembly_name, &summary, format)
            .with_context(|| format!("Failed to write summary to {}", path))?;
        info!("Summary written to {}", path);
    }

    Ok(summary)
}

fn list_cases(args: cli::ListArgs) -> Result<()> {
    let catalog = ScriptedCatalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog))?;
    let (assembly, cases) = catalog.build().context("Invalid catalog")?;

    println!("\n{} ({} cases)\n", assembly.display_name, cases.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_collection = String::new();
    for case in &cases {
        let collection = &case.collection().display_name;
        if *collection != current_collection {
            println!("\n{collection}:");
            println!("──────────────────────────────────────────────────────────────────────");
            current_collection = collection.clone();
        }

        if args.detailed {
            let traits: Vec<String> = case
                .traits
                .iter()
                .flat_map(|(name, values)| values.iter().map(move |v| format!("{name}={v}")))
                .collect();
            let mut line = format!("  {}", case.display_name);
            if !traits.is_empty() {
                line.push_str(&format!(" [{}]", traits.join(", ")));
            }
            if case.explicit {
                line.push_str(" (explicit)");
            }
            if let Some(reason) = &case.skip_reason {
                line.push_str(&format!(" (skip: {reason})"));
            }
            println!("{line}");
        } else {
            println!("  {}", case.display_name);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    Ok(())
}
