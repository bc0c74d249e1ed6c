//! Command-line surface: `serve` (default), `config validate`, `config show`,
//! `version`. Trimmed from the reference workspace's CLI — no provider
//! secret-store/login subcommands, since credential management for specific
//! providers is out of scope here; config loading and the `config` utilities
//! are kept verbatim.

use clap::{Parser, Subcommand};
use sa_domain::config::Config;

/// SerialAgent gateway — a multi-client conversational agent server.
#[derive(Debug, Parser)]
#[command(name = "serialagent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
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

/// Load the configuration from the path named by `SA_CONFIG` (or
/// `config.toml` by default). Falls back to `Config::default()` when no
/// file is present. Returns the parsed config and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("SA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

pub mod config {
    use sa_domain::config::{Config, ConfigSeverity};

    /// Parse and validate the config, printing any issues. Returns `true`
    /// when there are no `Error`-severity issues.
    pub fn validate(config: &Config, config_path: &str) -> bool {
        let issues = config.validate();

        if issues.is_empty() {
            println!("Config OK ({config_path})");
            return true;
        }

        let error_count = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).count();
        let warning_count = issues.len() - error_count;

        for issue in &issues {
            println!("{issue}");
        }

        println!("\n{} error(s), {} warning(s) in {config_path}", error_count, warning_count);

        error_count == 0
    }

    /// Dump the resolved config (with all defaults filled in) as TOML.
    pub fn show(config: &Config) {
        match toml::to_string_pretty(config) {
            Ok(output) => print!("{output}"),
            Err(e) => {
                eprintln!("Failed to serialize config: {e}");
                std::process::exit(1);
            }
        }
    }
}
