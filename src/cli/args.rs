//! CLI argument definitions using clap
//!
//! Commands:
//! - cdc-warden start --config <path>
//! - cdc-warden check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cdc-warden - Active/standby control plane for change-data-capture destinations
#[derive(Parser, Debug)]
#[command(name = "cdc-warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the control plane and serve until interrupted
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./cdc-warden.json")]
        config: PathBuf,
    },

    /// Validate the configuration and print resolved instance configs
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./cdc-warden.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
