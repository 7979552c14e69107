pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// autoapply — an autonomous job-application engine.
#[derive(Debug, Parser)]
#[command(name = "autoapply", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the scheduler + HTTP shell (default when no subcommand is given).
    Serve,
    /// Run connectivity checks against the board, the LLM provider, and the store.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
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

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path named by `AUTOAPPLY_CONFIG` (or
/// `config.toml` by default). Shared by `serve`, `doctor`, and `config`.
pub fn load_config() -> anyhow::Result<(sa_domain::config::Config, String)> {
    let config_path = std::env::var("AUTOAPPLY_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = sa_domain::config::Config::load_or_default(&config_path);
    Ok((config, config_path))
}
