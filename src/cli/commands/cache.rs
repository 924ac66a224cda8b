//! Cache command - locate and clear the module cache

use crate::cache::{CacheCategory, CacheDirs};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::Config;
use crate::error::BufResult;
use console::style;
use std::io::{self, Write};
use std::path::PathBuf;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> BufResult<()> {
    let dirs = config.cache_dirs();

    match args.action {
        CacheAction::Path => {
            println!("{}", dirs.base().display());
            Ok(())
        }
        CacheAction::Clear { yes } => clear_cache(&dirs, yes),
    }
}

fn existing_paths(dirs: &CacheDirs) -> Vec<PathBuf> {
    CacheCategory::all()
        .iter()
        .map(|category| dirs.path(*category))
        .filter(|path| path.exists())
        .collect()
}

fn clear_cache(dirs: &CacheDirs, skip_confirm: bool) -> BufResult<()> {
    let paths = existing_paths(dirs);

    if paths.is_empty() {
        println!("No cache to clear in {}.", dirs.base().display());
        return Ok(());
    }

    println!("This will remove {} cache path(s):", paths.len());
    for path in &paths {
        println!("  {} {}", style("•").red(), path.display());
    }
    println!();

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = dirs.clear()?;
    println!("{} cleared {} cache path(s)", style("✓").green(), removed.len());

    Ok(())
}
