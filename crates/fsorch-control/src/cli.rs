//! Command-line interface for the control daemon.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Filesystem lifecycle control daemon.
#[derive(Debug, Parser)]
#[command(name = "fsorchd", about = "Fsorch filesystem lifecycle control daemon")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Daemon subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the control daemon.
    Serve {
        /// Path to the TOML or JSON configuration file.
        #[arg(long, default_value = "/etc/fsorch/control.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        /// Path to the TOML or JSON configuration file.
        #[arg(long, default_value = "/etc/fsorch/control.toml")]
        config: PathBuf,
    },
}
