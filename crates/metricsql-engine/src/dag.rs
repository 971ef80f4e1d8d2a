//! Dependency graph (DAG) construction and traversal
//!
//! Built from the direct dependencies of catalog entities. The graph is
//! informational: it reports what depends on what, it never reorders
//! migration steps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Node identifier (lower-cased entity name)
pub type NodeId = String;

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Forward edges: node -> list of nodes it depends on (parents)
    parents: BTreeMap<NodeId, Vec<NodeId>>,

    /// Reverse edges: node -> list of nodes that depend on it (children)
    children: BTreeMap<NodeId, Vec<NodeId>>,

    /// All nodes in the graph
    nodes: BTreeSet<NodeId>,
}

impl DependencyGraph {
    /// Build a graph from `(node, direct dependencies)` pairs
    pub fn from_edges<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let mut graph = Self::default();

        for (node, dependencies) in edges {
            let node_id = node.to_lowercase();
            graph.nodes.insert(node_id.clone());

            for dependency in dependencies {
                let dep_id = dependency.to_lowercase();
                graph.nodes.insert(dep_id.clone());

                let parents = graph.parents.entry(node_id.clone()).or_default();
                if !parents.contains(&dep_id) {
                    parents.push(dep_id.clone());
                    graph
                        .children
                        .entry(dep_id)
                        .or_default()
                        .push(node_id.clone());
                }
            }
        }

        graph
    }

    /// Get all nodes in the graph
    pub fn all_nodes(&self) -> Vec<&NodeId> {
        self.nodes.iter().collect()
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.parents
            .get(&node_id.to_lowercase())
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(&node_id.to_lowercase())
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all downstream nodes (transitive closure of children)
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(&self.children, node_id)
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(&self.parents, node_id)
    }

    /// Breadth-first closure over one edge direction
    fn walk(edges: &BTreeMap<NodeId, Vec<NodeId>>, node_id: &str) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        let mut result = Vec::new();

        if let Some(next) = edges.get(&node_id.to_lowercase()) {
            queue.extend(next);
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current.clone());

            if let Some(next) = edges.get(current) {
                queue.extend(next.iter().filter(|n| !visited.contains(n)));
            }
        }

        result
    }
}
