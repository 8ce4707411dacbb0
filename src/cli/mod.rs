//! CLI module for cdc-warden
//!
//! Provides command-line interface for:
//! - start: Boot the control plane and serve until Ctrl-C
//! - check: Validate configuration and print resolved instance configs

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, resolve_all, run, run_command, start, ResolvedConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_json;
