//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::BufResult;
use console::style;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> BufResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => {
            if init_config(manager, force).await? {
                println!(
                    "{} Configuration initialized at {}",
                    style("✓").green(),
                    manager.path().display()
                );
            } else {
                println!(
                    "{} Config already exists at {}",
                    style("!").yellow(),
                    manager.path().display()
                );
                println!("  Use --force to overwrite");
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> BufResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default config; returns false when a file exists and `force` is unset
async fn init_config(manager: &ConfigManager, force: bool) -> BufResult<bool> {
    if manager.path().exists() && !force {
        return Ok(false);
    }
    manager.save(&Config::default()).await?;
    Ok(true)
}
