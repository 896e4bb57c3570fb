//! Blackhole CLI
//!
//! Tools for testing regex filters against the rule database.

mod config;
mod error;
mod harness;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::debug;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::error::Result;
use crate::harness::{CheckOptions, HarnessOutcome, RegexTestOptions, ERROR_EXIT_CODE};

#[derive(Parser)]
#[command(name = "bh-cli")]
#[command(about = "Blackhole regex filter tools")]
struct Cli {
    /// Configuration file [default: /etc/blackhole/blackhole.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test a domain against one regex or against the rule database
    RegexTest {
        /// Domain to test
        domain: String,

        /// Pattern to test instead of the database filters
        pattern: Option<String>,

        /// Log every evaluated filter
        #[arg(short, long)]
        debug: bool,

        /// Only print matching filters
        #[arg(short, long)]
        quiet: bool,
    },

    /// Decide a domain the way the resolver would
    Check {
        /// Domain to decide
        domain: String,

        /// Client address whose groups apply
        #[arg(long)]
        client: Option<String>,

        /// Log every evaluated filter
        #[arg(short, long)]
        debug: bool,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match usage_exit_code(&e) {
            Some(code) => {
                let _ = e.print();
                std::process::exit(code);
            }
            None => e.exit(),
        },
    };

    let (debug, quiet) = match &cli.command {
        Commands::RegexTest { debug, quiet, .. } => (*debug, *quiet),
        Commands::Check { debug, .. } => (*debug, false),
    };
    init_logging(debug, quiet);

    match run(cli) {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(ERROR_EXIT_CODE);
        }
    }
}

/// Exit status for a rejected command line, or `None` for help and version
/// requests, which clap prints and exits on itself.
fn usage_exit_code(err: &clap::Error) -> Option<i32> {
    err.use_stderr().then_some(ERROR_EXIT_CODE)
}

fn init_logging(debug: bool, quiet: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    Builder::from_env(Env::default().default_filter_or(level))
        .target(Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<HarnessOutcome> {
    let config = match &cli.config {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => {
            debug!("Loading configuration from {DEFAULT_CONFIG_PATH} if present");
            Config::load_or_default(DEFAULT_CONFIG_PATH)?
        }
    };
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::RegexTest {
            domain,
            pattern,
            debug,
            quiet,
        } => {
            let opts = RegexTestOptions {
                domain,
                pattern,
                debug,
                quiet,
            };
            harness::run_regex_test(&config, &opts, &mut stdout)
        }
        Commands::Check { domain, client, debug } => {
            let opts = CheckOptions { domain, client, debug };
            harness::run_check(&config, &opts, &mut stdout)
        }
    }
}
