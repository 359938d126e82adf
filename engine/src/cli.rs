//! CLI interface for Trawl
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for managing plugin packages.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `--version` text: package version, commit and build time
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    " ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Trawl plugin package manager
///
/// Resolves plugin packages and their dependencies from the configured feeds,
/// checks them against the local security policy, and installs them.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version = LONG_VERSION, about, long_about = None)]
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
    /// Install a plugin package and its dependencies
    Install {
        /// Package id
        package_id: String,

        /// Version to install (default: latest stable)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Remove an installed plugin
    Uninstall {
        /// Plugin id
        plugin_id: String,
    },

    /// Update an installed plugin to the latest version
    Update {
        /// Plugin id
        plugin_id: String,
    },

    /// List installed plugins
    List,

    /// Show installed plugins with newer versions available
    CheckUpdates,

    /// Check a package without installing it
    Validate {
        /// Package id
        package_id: String,

        /// Version to check (default: latest stable)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Show the dependency graph of a package
    Resolve {
        /// Package id
        package_id: String,

        /// Version to resolve (default: latest stable)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Show extracted dependencies and modules provided by the host
    Cache,

    /// Validate configuration and show engine paths
    Doctor,
}
