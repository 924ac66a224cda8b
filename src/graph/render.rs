//! DOT and JSON renderings of a resolved dependency graph
//!
//! Both are pure and deterministic: nodes and edges are sorted by name so
//! the same graph always renders to the same text.

use crate::error::BufResult;
use crate::graph::Dag;
use crate::module::ModuleKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub commit: String,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<GraphNode>,
}

fn sorted<'a>(mut keys: Vec<&'a ModuleKey>) -> Vec<&'a ModuleKey> {
    keys.sort_by(|a, b| {
        a.full_name()
            .cmp(b.full_name())
            .then_with(|| a.commit_id().cmp(&b.commit_id()))
    });
    keys
}

pub fn to_dot(dag: &Dag<ModuleKey>) -> String {
    let mut out = String::from("digraph {\n");
    let mut lines: Vec<String> = Vec::new();
    for node in sorted(dag.nodes().iter().collect()) {
        let deps = sorted(dag.outbound(node));
        if deps.is_empty() {
            if dag.inbound(node).is_empty() {
                lines.push(format!("  \"{node}\""));
            }
            continue;
        }
        for dep in deps {
            lines.push(format!("  \"{node}\" -> \"{dep}\""));
        }
    }
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
    out.push_str("}\n");
    out
}

/// Commit create times by module key; modules without one render without it
pub type CommitTimes = HashMap<ModuleKey, DateTime<Utc>>;

fn build_node(
    dag: &Dag<ModuleKey>,
    key: &ModuleKey,
    times: &CommitTimes,
) -> BufResult<GraphNode> {
    let deps = sorted(dag.outbound(key))
        .into_iter()
        .map(|dep| build_node(dag, dep, times))
        .collect::<BufResult<Vec<_>>>()?;
    Ok(GraphNode {
        name: key.full_name().to_string(),
        commit: key.dashless_commit_id(),
        digest: key.digest()?.to_string(),
        create_time: times.get(key).copied(),
        deps,
    })
}

/// Nested tree rooted at every module nothing depends on
pub fn to_tree(dag: &Dag<ModuleKey>, times: &CommitTimes) -> BufResult<Vec<GraphNode>> {
    dag.topological_order()?;
    sorted(dag.sources())
        .into_iter()
        .map(|root| build_node(dag, root, times))
        .collect()
}

pub fn to_json(dag: &Dag<ModuleKey>, times: &CommitTimes) -> BufResult<String> {
    Ok(serde_json::to_string_pretty(&to_tree(dag, times)?)?)
}
