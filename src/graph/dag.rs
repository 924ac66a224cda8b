//! Directed acyclic graph keyed by node value
//!
//! Nodes keep insertion order so every traversal is deterministic. An edge
//! `a -> b` means `a` depends on `b`.

use crate::error::{BufError, BufResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct Dag<K> {
    nodes: Vec<K>,
    index: HashMap<K, usize>,
    outbound: Vec<Vec<usize>>,
    inbound: Vec<Vec<usize>>,
}

impl<K> Default for Dag<K> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            outbound: Vec::new(),
            inbound: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash + Display> Dag<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if absent, returning its index
    pub fn add_node(&mut self, node: K) -> usize {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.clone(), idx);
        self.nodes.push(node);
        self.outbound.push(Vec::new());
        self.inbound.push(Vec::new());
        idx
    }

    /// Add `from -> to`, adding either node if absent
    pub fn add_edge(&mut self, from: K, to: K) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if !self.outbound[from].contains(&to) {
            self.outbound[from].push(to);
            self.inbound[to].push(from);
        }
    }

    pub fn contains(&self, node: &K) -> bool {
        self.index.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[K] {
        &self.nodes
    }

    /// Direct dependencies of a node
    pub fn outbound(&self, node: &K) -> Vec<&K> {
        self.index
            .get(node)
            .map(|&idx| self.outbound[idx].iter().map(|&i| &self.nodes[i]).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of a node
    pub fn inbound(&self, node: &K) -> Vec<&K> {
        self.index
            .get(node)
            .map(|&idx| self.inbound[idx].iter().map(|&i| &self.nodes[i]).collect())
            .unwrap_or_default()
    }

    /// Nodes nothing depends on
    pub fn sources(&self) -> Vec<&K> {
        (0..self.nodes.len())
            .filter(|&i| self.inbound[i].is_empty())
            .map(|i| &self.nodes[i])
            .collect()
    }

    /// Every edge as `(from, to)` pairs
    pub fn edges(&self) -> Vec<(&K, &K)> {
        self.outbound
            .iter()
            .enumerate()
            .flat_map(|(from, tos)| tos.iter().map(move |&to| (&self.nodes[from], &self.nodes[to])))
            .collect()
    }

    /// Order nodes so every node comes before its dependencies
    ///
    /// Uses Kahn's algorithm; a cycle fails with the cycle path.
    pub fn topological_order(&self) -> BufResult<Vec<K>> {
        let mut in_degree: Vec<usize> = self.inbound.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop_front() {
            order.push(self.nodes[idx].clone());
            for &next in &self.outbound[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(BufError::GraphCycle {
                cycle: self.describe_cycle(),
            });
        }
        Ok(order)
    }

    /// Nodes reachable from `roots` (roots included), breadth first
    pub fn reachable<'a>(&self, roots: impl IntoIterator<Item = &'a K>) -> Vec<K>
    where
        K: 'a,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            if let Some(&idx) = self.index.get(root) {
                if seen.insert(idx) {
                    queue.push_back(idx);
                }
            }
        }
        let mut out = Vec::new();
        while let Some(idx) = queue.pop_front() {
            out.push(self.nodes[idx].clone());
            for &next in &self.outbound[idx] {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        out
    }

    fn describe_cycle(&self) -> String {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            idx: usize,
            outbound: &[Vec<usize>],
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[idx] = Mark::Active;
            stack.push(idx);
            for &next in &outbound[idx] {
                match marks[next] {
                    Mark::Active => {
                        let start = stack.iter().position(|&i| i == next).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Mark::New => {
                        if let Some(cycle) = visit(next, outbound, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[idx] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            if marks[idx] != Mark::New {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = visit(idx, &self.outbound, &mut marks, &mut stack) {
                return cycle
                    .iter()
                    .map(|&i| self.nodes[i].to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
            }
        }
        "unknown cycle".to_string()
    }
}
