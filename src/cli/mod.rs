use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// `hostconverge` - idempotent single-host provisioning.
#[derive(Parser, Debug)]
#[command(name = "hostconverge")]
#[command(version)]
#[command(about = "Converge a host to the state described by a plan manifest.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.hostconverge/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge the host: probe each step and apply what is missing
    Apply {
        /// Plan manifest (TOML)
        manifest: PathBuf,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Maximum steps in flight (overrides config)
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        parallel: Option<u64>,

        /// Default per-step timeout in seconds (overrides config)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Probe every step without changing anything
    Check {
        /// Plan manifest (TOML)
        manifest: PathBuf,
    },

    /// Validate the plan and print its execution order
    Validate {
        /// Plan manifest (TOML)
        manifest: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
