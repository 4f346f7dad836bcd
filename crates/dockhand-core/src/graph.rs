//! Dependency graph of resolved services using `petgraph`.
//!
//! Yields the order in which backing services must be started: every
//! service after the services it depends on.

use std::collections::HashMap;

use dockhand_common::error::{DockhandError, Result};
use petgraph::graph::{DiGraph, NodeIndex};

/// A directed graph of services keyed by image name.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service node, returning the existing node for a known name.
    pub fn add_service(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        let _ = self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The edge points from `dependency` to `dependent` so that a
    /// topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependency, dependent, ());
    }

    /// Returns the number of distinct services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns every service, dependencies before their dependents.
    ///
    /// # Errors
    ///
    /// Returns `DockhandError::CyclicDependency` if the graph has a cycle.
    pub fn startup_order(&self) -> Result<Vec<String>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                    .collect()
            })
            .map_err(|cycle| DockhandError::CyclicDependency {
                chain: self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .into_iter()
                    .collect(),
            })
    }
}
