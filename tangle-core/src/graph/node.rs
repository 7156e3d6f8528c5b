//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! A node only carries topology; the typed value cell lives in
//! `reactive::signal` and is looked up by [`NodeId`].

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An emitter. The roots of every propagation pass triggered from outside.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node that also carries its own initial value (`start_with`).
    Seeded,

    /// A derived node (map, filter, merge, ...).
    Derived,

    /// A sink placeholder allocated by the wiring resolver before its
    /// definition runs.
    Placeholder,

    /// An observer. These are leaves of the graph: they have dependencies
    /// but no dependents.
    Observer,
}

impl NodeKind {
    /// Whether a node of this kind can emit without any upstream emission.
    pub fn is_generator(self) -> bool {
        matches!(self, NodeKind::Source | NodeKind::Seeded)
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Diagnostic name used in errors and logs.
    label: Option<Rc<str>>,

    /// Nodes whose emissions trigger this node, in subscription order.
    dependencies: IndexSet<NodeId>,

    /// Nodes triggered by this node, in subscription order.
    dependents: IndexSet<NodeId>,

    /// Upstreams re-delivered to this node in a follow-up pass.
    /// Never part of a pass ordering; only used for cycle analysis.
    deferred_dependencies: IndexSet<NodeId>,

    /// Downstreams this node re-delivers to in a follow-up pass.
    deferred_dependents: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            label: None,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            deferred_dependencies: IndexSet::new(),
            deferred_dependents: IndexSet::new(),
        }
    }

    /// Create a new source (emitter) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new derived node.
    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    /// Create a new observer node.
    pub fn observer() -> Self {
        Self::new(NodeKind::Observer)
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Set the diagnostic label.
    pub fn set_label(&mut self, label: impl Into<Rc<str>>) {
        self.label = Some(label.into());
    }

    /// Label if present, otherwise the ID.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.to_string(),
            None => self.id.to_string(),
        }
    }

    /// Add a dependency (a node whose emissions trigger this one).
    ///
    /// Returns `false` if the dependency already existed.
    pub fn add_dependency(&mut self, node_id: NodeId) -> bool {
        self.dependencies.insert(node_id)
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node triggered by this one).
    ///
    /// Returns `false` if the dependent already existed.
    pub fn add_dependent(&mut self, node_id: NodeId) -> bool {
        self.dependents.insert(node_id)
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub fn add_deferred_dependency(&mut self, node_id: NodeId) {
        self.deferred_dependencies.insert(node_id);
    }

    pub fn add_deferred_dependent(&mut self, node_id: NodeId) {
        self.deferred_dependents.insert(node_id);
    }

    pub fn remove_deferred(&mut self, node_id: NodeId) {
        self.deferred_dependencies.shift_remove(&node_id);
        self.deferred_dependents.shift_remove(&node_id);
    }

    pub fn deferred_dependencies(&self) -> &IndexSet<NodeId> {
        &self.deferred_dependencies
    }

    pub fn deferred_dependents(&self) -> &IndexSet<NodeId> {
        &self.deferred_dependents
    }
}
