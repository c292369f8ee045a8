//! Clap derive structures for the `forch` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// forch -- state tracking for Faucet-controlled stacked fabrics
#[derive(Debug, Parser)]
#[command(
    name = "forch",
    version,
    about = "Track and query the state of a Faucet-controlled network",
    long_about = "Follows the Faucet event socket, restores state from Faucet's \
        Prometheus varz endpoint, and answers health and path queries \
        about switches, stack links, egress and learned hosts.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (default: ./forch.toml)
    #[arg(long, short = 'c', env = "FORCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Faucet dps YAML (overrides faucet_config)
    #[arg(long, short = 'f', global = true)]
    pub faucet_config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enums ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the event socket until interrupted
    Run,

    /// Restore once from varz and dump the full state
    Restore,

    /// Restore from varz and print health summaries
    Status,

    /// Restore from varz and show switch detail
    #[command(alias = "sw")]
    Switches {
        /// Only this switch
        name: Option<String>,
    },

    /// Restore from varz and show stack links, egress and VLANs
    #[command(alias = "dp")]
    Dataplane,

    /// Restore from varz and list learned hosts
    Hosts,

    /// Restore from varz and trace a forwarding path
    #[command(subcommand)]
    Path(PathCommand),

    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum PathCommand {
    /// Path from a switch to the egress port on the stack root
    Switch {
        name: String,

        /// Ingress port on the starting switch
        #[arg(long)]
        in_port: Option<u32>,
    },

    /// Path between two hosts, or from a host to egress
    Host {
        /// Source MAC address
        src: String,

        /// Destination MAC address
        dst: Option<String>,

        /// Trace toward egress even when a destination is given
        #[arg(long)]
        to_egress: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print merged settings as TOML
    Show,

    /// Validate settings and the Faucet dps file
    Check,
}
