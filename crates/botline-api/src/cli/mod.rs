//! CLI command definitions for the `botline` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and manage the multi-tenant messaging gateway.
#[derive(Parser)]
#[command(name = "botline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway: auto-start tenants, idle cleanup and the admin API.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Export spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },

    /// Print the effective configuration (file + environment).
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "info,botline_core=debug,botline_infra=debug",
            _ => "trace",
        }
    }
}
