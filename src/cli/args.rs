//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::core::models::{Priority, TrackingType};
use crate::error::TrackError;

/// Ocean freight tracking across many providers.
#[derive(Parser, Debug)]
#[command(name = "shiptrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH", global = true, env = "SHIPTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSON logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track one or more shipments
    Track(TrackArgs),

    /// Show configured providers with live health, tokens and spend
    Providers,

    /// Inspect the configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the `track` command.
#[derive(Parser, Debug, Clone)]
pub struct TrackArgs {
    /// Container, bill of lading, or booking numbers
    #[arg(required = true, value_name = "NUMBER")]
    pub numbers: Vec<String>,

    /// Tracking type (container, bol, booking); inferred when omitted
    #[arg(long = "type", value_name = "TYPE", value_parser = parse_tracking_type)]
    pub tracking_type: Option<TrackingType>,

    /// Request priority (high, medium, low)
    #[arg(long, value_name = "PRIORITY", value_parser = parse_priority)]
    pub priority: Option<Priority>,

    /// Skip the cache and query every eligible provider
    #[arg(long)]
    pub refresh: bool,

    /// Print engine metrics after the results
    #[arg(long)]
    pub stats: bool,
}

impl TrackArgs {
    /// Priority for this invocation.
    ///
    /// A lone interactive lookup skips batching unless a priority was given.
    #[must_use]
    pub fn effective_priority(&self) -> Option<Priority> {
        self.priority
            .or_else(|| (self.numbers.len() == 1).then_some(Priority::High))
    }
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Check the configuration file for errors
    Validate,
    /// Print the config file path
    Path,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    #[default]
    Human,
    /// JSON output
    Json,
}

fn parse_tracking_type(s: &str) -> Result<TrackingType, String> {
    s.parse().map_err(|e: TrackError| e.to_string())
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|e: TrackError| e.to_string())
}
