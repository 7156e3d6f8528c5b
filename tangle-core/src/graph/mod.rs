//! Dependency Graph
//!
//! This module implements the topology of the signal graph: which nodes
//! trigger which, and in what order a propagation pass visits them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent signals (emitters, derived signals, sink placeholders)
//!   and observers
//! - Edges represent subscriptions: if A depends on B, there is an edge from B to A
//!
//! When an emitter fires, we collect every node reachable from it, order
//! them topologically and let the runtime visit them in that order.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than per-signal subscriber lists because:
//!    - It enables a topological order for each pass
//!    - It simplifies cycle detection
//!    - Subscriptions can be detached without touching the upstream's value cell
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.
//!
//! 4. Edge sets are insertion ordered so that passes are deterministic.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
