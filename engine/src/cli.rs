//! CLI interface for Vigil
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use crate::replay::Scenario;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vigil meta-cognitive safety monitor
///
/// Supervises step-by-step agent executions, detects pathological patterns
/// (loops, confusion, overconfidence, resource exhaustion, contradictions)
/// and halts sessions whose interventions keep failing.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
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

impl Cli {
    /// File checked by `config validate`: the positional path, else `--config`
    pub fn validate_target(&self, path: Option<&PathBuf>) -> Option<PathBuf> {
        path.or(self.config.as_ref()).cloned()
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSON Lines trace of step records through the monitor
    Replay {
        /// Trace file, one step record per line
        path: PathBuf,

        /// Step budget for every session (default: from config)
        #[arg(long, value_name = "N")]
        max_steps: Option<u64>,

        /// Token budget for every session (default: from config)
        #[arg(long, value_name = "N")]
        token_budget: Option<u64>,
    },

    /// Run a built-in adversarial scenario
    Demo {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Scenario,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// File to validate (default: the active configuration file)
        path: Option<PathBuf>,
    },

    /// Write the default configuration to ~/.vigil/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
