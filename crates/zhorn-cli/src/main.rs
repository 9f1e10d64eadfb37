//! zhorn CLI
//!
//! Evaluates destinations against a whitelist policy without a browser host,
//! and inspects the layered configuration.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use zhorn_config::ShowFormat;

mod commands;
pub mod config_bridge;
mod theme;

use commands::check::{self, CheckArgs, SinkArg};
use commands::config;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable
    Pretty,
    /// JSON
    Json,
}

/// zhorn - outbound call guard
#[derive(Parser)]
#[command(name = "zhorn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the layered lookup
    #[arg(short, long, global = true, env = "ZHORN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one outbound call through the guard and report the verdict
    Check {
        /// Destination URL (markup for the markup sink)
        destination: String,

        /// Sink the call goes through
        #[arg(short, long, value_enum, default_value = "beacon")]
        sink: SinkArg,

        /// HTTP method for request sinks
        #[arg(short, long)]
        method: Option<String>,

        /// Element tag for the attribute sink
        #[arg(long, default_value = "img")]
        tag: String,

        /// Attribute name for the attribute sink
        #[arg(long, default_value = "src")]
        attribute: String,

        /// JSON payload sent with the call
        #[arg(short, long)]
        payload: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show {
        /// toml or json
        #[arg(long, default_value = "toml")]
        format: ShowFormat,
    },
    /// Check that the configuration loads and converts
    Validate,
}

fn setup_logging(cli: &Cli) {
    let loaded = match &cli.config {
        Some(path) => zhorn_config::Config::load_file(path).ok(),
        None => {
            let workspace_root = std::env::current_dir().ok();
            zhorn_config::Config::load(workspace_root.as_deref())
                .ok()
                .map(|r| r.config)
        },
    };

    let log_config = if let Some(cfg) = &loaded {
        let mut lc = config_bridge::to_log_config(cfg);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        // Config errors surface from the command itself.
        let level = if cli.verbose { "debug" } else { "warn" };
        zhorn_telemetry::LogConfig::new(level).with_format(zhorn_telemetry::LogFormat::Compact)
    };
    if let Err(e) = zhorn_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(&cli);

    match cli.command {
        Commands::Check {
            destination,
            sink,
            method,
            tag,
            attribute,
            payload,
            format,
        } => {
            let cfg = config::resolve(cli.config.as_deref())?.config;
            let args = CheckArgs {
                destination,
                sink,
                method,
                tag,
                attribute,
                payload,
            };
            let report = check::run_check(&args, &cfg)?;
            check::print_report(&report, format)?;
            Ok(if report.allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        },
        Commands::Config { command } => {
            match command {
                ConfigCommands::Show { format } => {
                    config::show_config(cli.config.as_deref(), format)?;
                },
                ConfigCommands::Validate => config::validate_config(cli.config.as_deref())?,
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}
