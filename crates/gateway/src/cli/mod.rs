pub mod config;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ir_domain::config::Config;
use ir_domain::{Error, Result};

/// IntentRelay: forwards Dialogflow intents to signed-in websocket clients.
#[derive(Debug, Parser)]
#[command(name = "intentrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the relay server (default when no subcommand is given).
    Serve(ServeArgs),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Default, clap::Args)]
pub struct ServeArgs {
    /// Override `server.host`.
    #[arg(long)]
    pub host: Option<String>,
    /// Override `server.port`.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    /// Apply command-line bind overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `IR_CONFIG` (or `config.toml`).
/// A missing file yields the defaults.
pub fn load_config() -> Result<(Config, PathBuf)> {
    let config_path =
        PathBuf::from(std::env::var("IR_CONFIG").unwrap_or_else(|_| "config.toml".into()));
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config_from(Path::new("/nonexistent/intentrelay.toml")).unwrap();
        assert_eq!(cfg.server.port, 9090);
    }

    #[test]
    fn reads_and_rejects_files() {
        let dir = std::env::temp_dir().join(format!("ir-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.toml");
        std::fs::write(&good, "[server]\nport = 7000\n").unwrap();
        assert_eq!(load_config_from(&good).unwrap().server.port, 7000);

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "[server\nport = ").unwrap();
        assert!(matches!(load_config_from(&bad), Err(Error::Config(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn serve_overrides_bind_address() {
        let cli = Cli::parse_from(["intentrelay", "serve", "--port", "8088", "--host", "0.0.0.0"]);
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        let mut cfg = Config::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8088");
    }

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::parse_from(["intentrelay"]);
        assert!(cli.command.is_none());
    }
}
