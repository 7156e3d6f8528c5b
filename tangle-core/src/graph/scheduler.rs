//! Update Scheduler
//!
//! The scheduler owns the topology of the signal graph and determines the
//! order in which nodes are visited during a propagation pass. It ensures
//! that every upstream is visited before its dependents.
//!
//! # Algorithm
//!
//! We use a topological sort over the part of the graph reachable from the
//! pass roots:
//!
//! 1. Collect every node reachable from the roots through dependent edges
//! 2. Sort them topologically (Kahn's algorithm, dependencies first)
//! 3. Hand the order to the runtime, which visits each node whose upstream
//!    actually emitted during the pass
//!
//! Because a node is only visited after all of its reachable upstreams, it
//! never observes a half-updated pass (no glitches).
//!
//! Deferred edges (see the wiring resolver) never take part in a pass order.
//! They exist so that cycle analysis can see the full reference graph.

use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::node::{Node, NodeId};
use crate::error::ReactiveError;

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        for other in node
            .deferred_dependencies()
            .iter()
            .chain(node.deferred_dependents())
        {
            if let Some(other) = self.nodes.get_mut(other) {
                other.remove_deferred(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Whether the node is still part of the graph.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// This means when `dependency` emits, `dependent` is visited in the
    /// same pass. Returns `false` if the edge already existed.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) -> bool {
        if !self.nodes.contains_key(&dependency) || !self.nodes.contains_key(&dependent) {
            return false;
        }
        let mut inserted = false;
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            inserted |= dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            inserted |= dependent_node.add_dependency(dependency);
        }
        inserted
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Record a deferred edge: `dependency` re-delivers into `dependent`
    /// through a follow-up pass.
    pub fn add_deferred_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_deferred_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_deferred_dependency(dependency);
        }
    }

    /// Replace the upstream set of `node`.
    ///
    /// Every existing dependency not listed in `anchors` is detached first,
    /// then `upstreams` are attached in order. Returns the detached IDs.
    pub fn rebind(
        &mut self,
        node_id: NodeId,
        anchors: &[NodeId],
        upstreams: &[NodeId],
    ) -> Vec<NodeId> {
        let stale: Vec<NodeId> = match self.nodes.get(&node_id) {
            Some(node) => node
                .dependencies()
                .iter()
                .filter(|dep| !anchors.contains(*dep))
                .copied()
                .collect(),
            None => return Vec::new(),
        };

        for &dep in &stale {
            self.remove_edge(dep, node_id);
        }
        for &upstream in upstreams {
            self.add_edge(upstream, node_id);
        }
        stale
    }

    /// Whether `to` is reachable from `from` through dependent edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::from([from]);

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                for &dependent_id in node.dependents() {
                    if dependent_id == to {
                        return true;
                    }
                    queue.push_back(dependent_id);
                }
            }
        }
        false
    }

    /// Compute the visit order for a pass started at `roots`.
    ///
    /// The order contains the roots and every node reachable from them,
    /// dependencies before dependents. Fails if the reachable subgraph
    /// contains a cycle.
    pub fn pass_order(&self, roots: &[NodeId]) -> Result<Vec<NodeId>, ReactiveError> {
        let mut reachable = IndexSet::new();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();

        // BFS over dependents
        while let Some(node_id) = queue.pop_front() {
            if !reachable.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                queue.extend(node.dependents().iter().copied());
            }
        }

        // Sort topologically so dependencies are processed first
        let order = self.topological_sort(&reachable);
        if order.len() < reachable.len() {
            let stuck: Vec<NodeId> = reachable
                .iter()
                .filter(|id| !order.contains(*id))
                .copied()
                .collect();
            return Err(ReactiveError::Cycle {
                labels: self.display_names(&stuck),
            });
        }
        Ok(order)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    /// Nodes on a cycle are left out of the result.
    fn topological_sort(&self, nodes: &IndexSet<NodeId>) -> Vec<NodeId> {
        let mut in_degree: IndexMap<NodeId, usize> = IndexMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| nodes.contains(*d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// The strongly connected region containing `node_id`, following both
    /// immediate and deferred edges.
    ///
    /// A node that sits on no cycle forms a region of one.
    pub fn region(&self, node_id: NodeId) -> IndexSet<NodeId> {
        let forward = self.walk(node_id, |node| {
            node.dependents().iter().chain(node.deferred_dependents())
        });
        let backward = self.walk(node_id, |node| {
            node.dependencies().iter().chain(node.deferred_dependencies())
        });
        forward.intersection(&backward).copied().collect()
    }

    fn walk<'a, F, I>(&'a self, start: NodeId, next: F) -> IndexSet<NodeId>
    where
        F: Fn(&'a Node) -> I,
        I: Iterator<Item = &'a NodeId>,
    {
        let mut visited = IndexSet::new();
        let mut stack = vec![start];
        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                stack.extend(next(node).copied());
            }
        }
        visited
    }

    /// Whether anything outside `region` can ever make a member emit.
    ///
    /// True if a member is a generator or has an upstream outside the region.
    pub fn region_is_live(&self, region: &IndexSet<NodeId>) -> bool {
        region.iter().filter_map(|id| self.nodes.get(id)).any(|node| {
            node.kind().is_generator()
                || node
                    .dependencies()
                    .iter()
                    .chain(node.deferred_dependencies())
                    .any(|dep| !region.contains(dep))
        })
    }

    /// Display names of the given nodes.
    pub fn display_names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| match self.nodes.get(id) {
                Some(node) => node.display_name(),
                None => id.to_string(),
            })
            .collect()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of immediate edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.dependencies().len()).sum()
    }
}
