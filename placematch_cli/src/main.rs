mod cli;
mod display;
mod error;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, RunCommand};
use log::debug;
use placematch::config::Config;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config = read_config_from_toml(args.config.as_deref())?;
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config).await?;
    }
    Ok(())
}

/// Read the configuration from `path`, or from the user config directory when no path is given.
/// A missing default file gives the default configuration.
fn read_config_from_toml(path: Option<&Path>) -> Result<Config> {
    // macOS: ~/Library/Application Support/placematch/config.toml
    let file_path = match path {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => dir.join("placematch").join("config.toml"),
            None => return Ok(Config::default()),
        },
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => toml::from_str(&contents)
            .with_context(|| format!("Invalid TOML in config file '{}'", file_path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path.is_none() => {
            Ok(Config::default())
        }
        Err(e) => Err(e)
            .with_context(|| format!("Error reading config file '{}'", file_path.display())),
    }
}
