//! `config` subcommands.

use std::path::{Path, PathBuf};

use colored::Colorize;

use super::args::{ConfigCommand, OutputFormat};
use super::load_config;
use crate::error::{Result, TrackError};
use crate::render::robot::{RobotOutput, to_json};
use crate::storage::config::Config;

/// Run a config subcommand.
///
/// # Errors
/// Returns an error if the config cannot be loaded or is invalid.
pub fn execute(
    cmd: &ConfigCommand,
    path: Option<&Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let resolved: PathBuf = path.map_or_else(Config::config_path, Path::to_path_buf);

    match cmd {
        ConfigCommand::Path => {
            match format {
                OutputFormat::Human => println!("{}", resolved.display()),
                OutputFormat::Json => println!(
                    "{}",
                    to_json(&RobotOutput::new("config path", resolved.display().to_string()), pretty)?
                ),
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = load_config(path)?;
            match format {
                OutputFormat::Human => {
                    let toml = toml::to_string_pretty(&config)
                        .map_err(|e| TrackError::Config(e.to_string()))?;
                    println!("# {}\n{}", resolved.display(), toml.trim_end());
                }
                OutputFormat::Json => {
                    println!("{}", to_json(&RobotOutput::new("config show", &config), pretty)?);
                }
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = load_config(path)?;
            let http = config.providers.iter().filter(|p| p.base_url.is_some()).count();
            match format {
                OutputFormat::Human => println!(
                    "{} {} ({} providers, {http} with a base_url)",
                    "✓".green().bold(),
                    resolved.display(),
                    config.providers.len()
                ),
                OutputFormat::Json => println!(
                    "{}",
                    to_json(&RobotOutput::new("config validate", true), pretty)?
                ),
            }
            Ok(())
        }
    }
}
