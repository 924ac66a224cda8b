//! CLI argument definitions using clap derive

use crate::config::CONFIG_ENV;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// buf - Protobuf module dependency manager
///
/// Resolves `buf.yaml` dependencies against a registry, maintains
/// `buf.lock`, and manages the local module cache.
#[derive(Parser, Debug)]
#[command(name = "buf")]
#[command(author, version, long_about = None)]
#[command(about = "buf - Protobuf module dependency manager")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage buf.lock
    Dep(DepArgs),

    /// Manage the local module cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the dep command
#[derive(Parser, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub action: DepAction,
}

/// Dep subcommands
#[derive(Subcommand, Debug)]
pub enum DepAction {
    /// Re-resolve declared dependencies and rewrite buf.lock
    Update {
        /// Workspace directory (defaults to current directory)
        dir: Option<PathBuf>,

        /// Only update these modules, keep every other pin
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Remove unused dependencies from buf.lock
    Prune {
        /// Workspace directory (defaults to current directory)
        dir: Option<PathBuf>,
    },

    /// Print the dependency graph at the locked commits
    Graph {
        /// Workspace directory (defaults to current directory)
        dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "dot")]
        format: GraphFormat,
    },
}

/// Output format for dep graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    /// Graphviz DOT
    Dot,
    /// Nested JSON
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cache base directory
    Path,

    /// Remove every cached module, commit and lock
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
