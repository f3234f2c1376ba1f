//! shiptrack - ocean freight tracking aggregator
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use shiptrack::cli::{self, Cli, Commands, OutputFormat};
use shiptrack::core::logging::{self, LogFormat, LogSettings};
use shiptrack::error::{self, TrackError};
use shiptrack::render;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log = LogSettings::from_env(cli.verbose);
    if let Some(level) = cli.log_level.as_deref().and_then(logging::parse_level) {
        log.level = level;
    }
    if cli.json_output {
        log.format = LogFormat::Json;
    }
    logging::init(&log);

    let format = cli.effective_format();
    let pretty = cli.pretty;
    if !shiptrack::util::env::should_use_color(cli.no_color) {
        colored::control::set_override(false);
    }

    let command = command_name(&cli.command);
    match run(cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            let rendered = render::render_error(command, &e, format, pretty);
            match format {
                OutputFormat::Human => eprint!("{rendered}"),
                OutputFormat::Json => println!("{rendered}"),
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Track(_) => "track",
        Commands::Providers => "providers",
        Commands::Config(_) => "config",
        Commands::Completions { .. } => "completions",
    }
}

async fn run(cli: Cli) -> Result<error::ExitCode, TrackError> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Track(args) => {
            let config = cli::load_config(config_path)?;
            cli::track::execute(args, config, format, pretty).await
        }
        Commands::Providers => {
            let config = cli::load_config(config_path)?;
            cli::providers::execute(config, format, pretty)?;
            Ok(error::ExitCode::Success)
        }
        Commands::Config(cmd) => {
            cli::config::execute(cmd, config_path, format, pretty)?;
            Ok(error::ExitCode::Success)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "shiptrack",
                &mut std::io::stdout(),
            );
            Ok(error::ExitCode::Success)
        }
    }
}
