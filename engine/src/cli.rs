//! CLI interface for Switchyard
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags of the `switchyard` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Switchyard adaptive request dispatcher
///
/// Classifies requests, routes them to an analytical or creative
/// conversation branch and picks a local model for each one.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch one request and follow its progress (Ctrl-C cancels)
    Run {
        /// Request text
        text: String,

        /// Ask for a specific model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Interactive session over stdin (:reset, :status, :quit)
    Chat {
        /// Ask for a specific model for every request
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show the task tag and branch for a text
    Classify {
        /// Request text
        text: String,
    },

    /// Run model selection only and print the stage trace
    Route {
        /// Request text
        text: String,

        /// Requested model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List backend models with their parsed sizes
    Models,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["switchyard", "models"]);
        assert!(matches!(cli.command, Command::Models));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["switchyard", "--json", "--log", "debug", "models"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));

        let cli = Cli::parse_from(["switchyard", "classify", "hallo", "--config", "/tmp/s.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["switchyard", "run", "write a haiku", "--model", "tiny-1b"]);
        if let Command::Run { text, model } = cli.command {
            assert_eq!(text, "write a haiku");
            assert_eq!(model.as_deref(), Some("tiny-1b"));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_route_command_without_model() {
        let cli = Cli::parse_from(["switchyard", "route", "hallo"]);
        if let Command::Route { text, model } = cli.command {
            assert_eq!(text, "hallo");
            assert!(model.is_none());
        } else {
            panic!("Expected Route command");
        }
    }

    #[test]
    fn test_config_actions() {
        let cli = Cli::parse_from(["switchyard", "config", "path"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }
}
