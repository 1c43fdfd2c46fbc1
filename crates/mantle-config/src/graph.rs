//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph of resources and outputs from configuration
//! references and resolves topological ordering for planning and apply.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write as _};

use mantle_common::diagnostics::Diagnostic;
use mantle_common::types::ResourceAddr;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use crate::loader::Config;
use crate::parser::ast::Reference;

/// A vertex in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphNode {
    /// A managed or data resource.
    Resource(ResourceAddr),
    /// A root output value.
    Output(String),
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(addr) => write!(f, "{addr}"),
            Self::Output(name) => write!(f, "output.{name}"),
        }
    }
}

/// Errors from graph resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The graph contains at least one cycle.
    #[error("Cycle: {}", nodes.join(", "))]
    Cycle {
        /// Nodes on the cycle, sorted.
        nodes: Vec<String>,
    },
}

impl From<GraphError> for Diagnostic {
    fn from(err: GraphError) -> Self {
        Self::error(
            err.to_string(),
            "The configuration contains a dependency cycle. Each object on the cycle depends on the next.",
        )
    }
}

/// A dependency graph of resources and outputs.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Internal petgraph representation. Edges point from a dependency to
    /// its dependent.
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<GraphNode, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of every resource and output in `config`.
    ///
    /// References to undeclared objects are ignored here; validation reports
    /// them.
    pub fn from_config(config: &Config) -> Self {
        let mut graph = Self::new();
        for resource in &config.resources {
            let _ = graph.add_node(GraphNode::Resource(resource.addr.clone()));
        }
        for output in &config.outputs {
            let _ = graph.add_node(GraphNode::Output(output.name.clone()));
        }

        for resource in &config.resources {
            let dependent = GraphNode::Resource(resource.addr.clone());
            let mut deps: BTreeSet<ResourceAddr> = resource.dependencies();
            // Self references are kept so that they surface as cycles.
            if resource
                .references()
                .iter()
                .any(|(r, _)| matches!(r, Reference::Resource { addr, .. } if addr == &resource.addr))
            {
                let _ = deps.insert(resource.addr.clone());
            }
            for dep in deps {
                graph.link(&dependent, &GraphNode::Resource(dep));
            }
        }
        for output in &config.outputs {
            let dependent = GraphNode::Output(output.name.clone());
            for (reference, _) in output.value.references() {
                if let Reference::Resource { addr, .. } = reference {
                    graph.link(&dependent, &GraphNode::Resource(addr.clone()));
                }
            }
        }
        graph
    }

    fn link(&mut self, dependent: &GraphNode, dependency: &GraphNode) {
        if let (Some(&a), Some(&b)) = (self.index.get(dependent), self.index.get(dependency)) {
            self.add_dependency(a, b);
        }
    }

    /// Adds a node, returning the existing index if it is already present.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        let _ = self.index.insert(node, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        if self.graph.find_edge(dependency, dependent).is_none() {
            let _ = self.graph.add_edge(dependency, dependent, ());
        }
    }

    /// Returns true if the node is in the graph.
    pub fn contains(&self, node: &GraphNode) -> bool {
        self.index.contains_key(node)
    }

    /// Every node, sorted.
    pub fn nodes(&self) -> BTreeSet<GraphNode> {
        self.index.keys().cloned().collect()
    }

    /// Returns a topological ordering with dependencies first.
    ///
    /// Ties are broken by node order so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error naming the nodes of a cycle if one exists.
    pub fn resolve_order(&self) -> Result<Vec<GraphNode>, GraphError> {
        if let Some(cycle) = self.cycles().into_iter().next() {
            return Err(GraphError::Cycle {
                nodes: cycle.iter().map(ToString::to_string).collect(),
            });
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<(GraphNode, NodeIndex)> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&idx, _)| (self.graph[idx].clone(), idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(entry) = ready.pop_first() {
            let (node, idx) = entry;
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        let _ = ready.insert((self.graph[next].clone(), next));
                    }
                }
            }
            order.push(node);
        }
        Ok(order)
    }

    /// Direct dependencies of a node.
    pub fn direct_dependencies(&self, node: &GraphNode) -> BTreeSet<GraphNode> {
        self.index.get(node).map_or_else(BTreeSet::new, |&idx| {
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|n| self.graph[n].clone())
                .collect()
        })
    }

    /// Transitive dependencies of a node, excluding the node itself.
    pub fn dependencies_of(&self, node: &GraphNode) -> BTreeSet<GraphNode> {
        let Some(&start) = self.index.get(node) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                let _ = out.insert(self.graph[idx].clone());
            }
        }
        out
    }

    /// Transitive dependents of a node, excluding the node itself.
    pub fn dependents_of(&self, node: &GraphNode) -> BTreeSet<GraphNode> {
        let Some(&start) = self.index.get(node) else {
            return BTreeSet::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                let _ = out.insert(self.graph[idx].clone());
            }
        }
        out
    }

    /// Strongly connected components that form cycles, each sorted.
    pub fn cycles(&self) -> Vec<Vec<GraphNode>> {
        let mut out: Vec<Vec<GraphNode>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.first().is_some_and(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|scc| {
                let mut nodes: Vec<GraphNode> = scc.into_iter().map(|n| self.graph[n].clone()).collect();
                nodes.sort();
                nodes
            })
            .collect();
        out.sort();
        out
    }

    /// Renders the graph in DOT format.
    ///
    /// When `only` is given, nodes outside it are left out. With
    /// `draw_cycles`, edges within a cycle are highlighted.
    pub fn to_dot(&self, only: Option<&BTreeSet<GraphNode>>, draw_cycles: bool) -> String {
        let include = |node: &GraphNode| only.is_none_or(|set| set.contains(node));
        let cyclic: BTreeSet<GraphNode> = if draw_cycles {
            self.cycles().into_iter().flatten().collect()
        } else {
            BTreeSet::new()
        };

        let mut out = String::from("digraph {\n\tcompound = \"true\"\n\tnewrank = \"true\"\n\tsubgraph \"root\" {\n");
        for node in self.nodes().iter().filter(|n| include(n)) {
            let shape = match node {
                GraphNode::Resource(_) => "box",
                GraphNode::Output(_) => "note",
            };
            let _ = writeln!(out, "\t\t\"[root] {node}\" [label = \"{node}\", shape = \"{shape}\"]");
        }

        let mut edges: Vec<(GraphNode, GraphNode)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(dep, dependent)| (self.graph[dependent].clone(), self.graph[dep].clone()))
            .filter(|(a, b)| include(a) && include(b))
            .collect();
        edges.sort();
        for (from, to) in edges {
            if cyclic.contains(&from) && cyclic.contains(&to) {
                let _ = writeln!(
                    out,
                    "\t\t\"[root] {from}\" -> \"[root] {to}\" [color = \"red\", penwidth = \"2.0\"]"
                );
            } else {
                let _ = writeln!(out, "\t\t\"[root] {from}\" -> \"[root] {to}\"");
            }
        }
        out.push_str("\t}\n}\n");
        out
    }
}
