//! Tether command-line driver
//!
//! Runs the runtime's end-to-end scenarios (pool, timer, queue) against a
//! configurable runtime and reports what it observed. Each scenario exits
//! non-zero when one of its checks fails.

mod commands;
mod output;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tether_core::RuntimeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether concurrency runtime driver", long_about = None)]
#[command(version)]
struct Cli {
    /// Runtime configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace); TETHER_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Colored output: auto, always or never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run work items through a thread pool and check each ran once
    Pool {
        /// Worker cap
        #[arg(long, default_value_t = 2)]
        threads: usize,
        /// Job queue limit (negative: fixed, 0: unbounded)
        #[arg(long, default_value_t = 4, allow_negative_numbers = true)]
        limit: i64,
        /// Number of work items
        #[arg(long, default_value_t = 10)]
        items: usize,
    },

    /// Schedule a one-shot task and try to cancel it
    Timer {
        /// Delay before the task is due
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
        /// When to attempt the cancel
        #[arg(long, default_value_t = 100)]
        cancel_at_ms: u64,
    },

    /// Fill a queue, shut it down, then drain it
    Queue {
        /// Number of items
        #[arg(long, default_value_t = 1000)]
        items: u64,
    },

    /// Show platform details and the effective configuration
    Info,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let mut out = output::StyledOutput::new(output::resolve_color_choice(cli.color.as_deref()));

    let passed = match cli.command {
        Commands::Pool {
            threads,
            limit,
            items,
        } => commands::pool::execute(&config, &mut out, threads, limit, items)?,
        Commands::Timer {
            delay_ms,
            cancel_at_ms,
        } => commands::timer::execute(&config, &mut out, delay_ms, cancel_at_ms)?,
        Commands::Queue { items } => commands::queue::execute(&config, &mut out, items)?,
        Commands::Info => {
            commands::info::execute(&config, cli.config.as_deref(), &mut out)?;
            true
        }
    };

    out.flush();
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}
