//! Dep command - update, prune and inspect buf.lock

use crate::cli::args::{DepAction, DepArgs, GraphFormat};
use crate::config::Config;
use crate::dep::{DepManager, DepOrigin, DepReport};
use crate::error::{BufError, BufResult};
use crate::graph::{to_dot, to_json, CommitTimes};
use crate::module::ModuleFullName;
use crate::registry::create_providers;
use console::style;
use std::env;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Execute the dep command
pub async fn execute(args: DepArgs, config: &Config) -> BufResult<()> {
    let providers = create_providers(config)?;
    let manager = DepManager::new(providers, config.digest.policy());
    let deadline = config.registry.timeout_secs;

    match args.action {
        DepAction::Update { dir, only } => {
            let dir = workspace_dir(dir)?;
            let only = only
                .iter()
                .map(|name| ModuleFullName::parse(name))
                .collect::<BufResult<Vec<_>>>()?;
            let report = with_deadline("dep update", deadline, manager.update(&dir, &only)).await?;
            print_report(&report, config);
        }
        DepAction::Prune { dir } => {
            let dir = workspace_dir(dir)?;
            let report = with_deadline("dep prune", deadline, manager.prune(&dir)).await?;
            print_report(&report, config);
        }
        DepAction::Graph { dir, format } => {
            let dir = workspace_dir(dir)?;
            let (dag, times) = with_deadline("dep graph", deadline, async {
                let dag = manager.graph(&dir).await?;
                let times = match format {
                    GraphFormat::Json => manager.commit_times(&dag).await?,
                    GraphFormat::Dot => CommitTimes::new(),
                };
                Ok((dag, times))
            })
            .await?;
            match format {
                GraphFormat::Dot => print!("{}", to_dot(&dag)),
                GraphFormat::Json => println!("{}", to_json(&dag, &times)?),
            }
        }
    }

    Ok(())
}

fn workspace_dir(dir: Option<PathBuf>) -> BufResult<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => env::current_dir().map_err(|e| BufError::io("getting current directory", e)),
    }
}

/// Bound `fut` by `secs` seconds; zero means no deadline
///
/// A future cut off by the deadline is dropped, which restores any lock
/// file it was in the middle of replacing.
async fn with_deadline<T>(
    operation: &str,
    secs: u64,
    fut: impl Future<Output = BufResult<T>>,
) -> BufResult<T> {
    if secs == 0 {
        return fut.await;
    }
    debug!("Running {} with a {}s deadline", operation, secs);
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| BufError::Timeout {
            operation: operation.to_string(),
            secs,
        })?
}

fn print_report(report: &DepReport, config: &Config) {
    if !config.general.suppress_warnings {
        for warning in &report.warnings {
            eprintln!("{} {}", style("Warning:").yellow().bold(), warning);
        }
    }

    if !report.changed {
        println!(
            "{} {} is up to date",
            style("✓").green(),
            report.lock_path.display()
        );
        return;
    }

    println!(
        "{} Wrote {} ({}, {} dependencies)",
        style("✓").green(),
        report.lock_path.display(),
        report.version,
        report.entries.len()
    );
    for entry in &report.entries {
        let origin = match entry.origin {
            DepOrigin::Declared => style(entry.origin.to_string()).cyan(),
            DepOrigin::Transitive => style(entry.origin.to_string()).dim(),
        };
        println!("  {} {} [{}]", style("•").cyan(), entry.key, origin);
    }
    for name in &report.pruned {
        println!("  {} {} removed", style("-").red(), name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BufError>(())
        };
        let err = with_deadline("dep update", 1, slow).await.unwrap_err();
        match err {
            BufError::Timeout { operation, secs } => {
                assert_eq!(operation, "dep update");
                assert_eq!(secs, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_deadline_waits() {
        let value = with_deadline("dep graph", 0, async { Ok::<_, BufError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn explicit_dir_is_kept() {
        let dir = workspace_dir(Some(PathBuf::from("proto"))).unwrap();
        assert_eq!(dir, PathBuf::from("proto"));
    }
}
