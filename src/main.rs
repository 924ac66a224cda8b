//! buf - Protobuf module dependency manager
//!
//! CLI entry point that dispatches to subcommands.

use buf::cli::{Cli, Commands};
use buf::config::ConfigManager;
use buf::error::BufResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let label = if e.is_internal() {
                "Internal error:"
            } else {
                "Error:"
            };
            eprintln!("{} {}", style(label).red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BufResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    config.apply_env();

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("buf=warn"),
        1 => EnvFilter::new("buf=info"),
        _ => EnvFilter::new("buf=debug"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }
    debug!("Loaded config from {}", config_manager.path().display());

    match cli.command {
        Commands::Dep(args) => buf::cli::commands::dep(args, &config).await,
        Commands::Cache(args) => buf::cli::commands::cache(args, &config).await,
        Commands::Config(args) => buf::cli::commands::config(args, &config, &config_manager).await,
    }
}
