pub mod config;
pub mod inspect;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use asp_domain::billing::Tier;
use asp_domain::config::Config;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ASP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Aspendos - the chat turn pipeline server.
#[derive(Debug, Parser)]
#[command(name = "aspendos", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Classify a query and print the memory decision as JSON.
    Classify {
        /// The user query to classify.
        query: String,
    },
    /// Resolve a model the way a turn would and print the outcome as JSON.
    Route {
        /// Requested model id (unknown ids fall back to the default).
        model: String,
        /// Caller's tier: free, pro or ultra.
        #[arg(long, default_value = "free")]
        tier: Tier,
        /// Message text used for smart pre-routing.
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config named by `ASP_CONFIG` (default `config.toml`).
///
/// Returns the config and the path it was read from.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let config = load_config_from(Path::new(&path))?;
    Ok((config, path))
}

/// A missing file yields the built-in defaults; a malformed one is an error.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
