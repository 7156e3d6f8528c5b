//! Reactive Runtime
//!
//! The runtime is the propagation context that connects signals. It owns
//! the dependency graph and runs propagation passes when values enter the
//! graph.
//!
//! # How It Works
//!
//! 1. When a signal is created, its node is registered with the runtime's
//!    scheduler together with the edges from its upstreams.
//!
//! 2. When an emitter emits, the runtime:
//!    a. Commits the value on the emitter's cell
//!    b. Asks the scheduler for a topological order of everything reachable
//!    c. Visits each node whose upstream emitted in this pass, in order
//!    d. Clears the pass emissions of every touched node
//!
//! 3. Anything that wants to start another pass while one is running
//!    (an emission from inside a combinator, a rebind, the initial values of
//!    a component built mid-pass) is queued and run after the current pass,
//!    before control returns to the original caller.
//!
//! # Threading
//!
//! The runtime is single-threaded (`Rc`/`RefCell`). There is no ambient or
//! global state: every runtime is an independent graph, so several of them
//! can coexist (for example one per test).

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use super::signal::{AnyNode, Emissions, Emitter, Operator, Signal, SignalCell};
use crate::config::RuntimeConfig;
use crate::error::{BoxError, ReactiveError};
use crate::graph::{Node, NodeId, NodeKind, UpdateScheduler};

/// Work that starts a propagation pass.
pub(crate) enum Pending {
    /// Commit a value on a root cell and propagate from it.
    Emit(Box<dyn FnOnce() -> Rc<dyn AnyNode>>),

    /// Recompute a node unconditionally and propagate from it.
    Refresh(NodeId),

    /// Deliver the current values of freshly seeded nodes.
    Seed(Vec<NodeId>),
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,

    pub(crate) scheduler: RefCell<UpdateScheduler>,

    /// Maps node IDs to weak references to avoid preventing cleanup.
    registry: RefCell<HashMap<NodeId, Weak<dyn AnyNode>>>,

    /// Passes waiting for the running pass to finish.
    queue: RefCell<VecDeque<Pending>>,

    /// Seeded nodes whose initial value has not been delivered yet.
    seeds: RefCell<Vec<NodeId>>,

    /// Nodes released while the graph was borrowed.
    released: RefCell<Vec<NodeId>>,

    /// Ownership scopes of components under construction.
    pub(crate) scopes: RefCell<Vec<Option<Vec<Weak<dyn AnyNode>>>>>,

    propagating: Cell<bool>,

    passes: Cell<u64>,
}

impl RuntimeInner {
    /// Remove a node from the graph. Safe to call at any time, any number
    /// of times.
    pub(crate) fn release(&self, id: NodeId) {
        match (self.scheduler.try_borrow_mut(), self.registry.try_borrow_mut()) {
            (Ok(mut scheduler), Ok(mut registry)) => {
                scheduler.remove_node(id);
                registry.remove(&id);
            }
            _ => self.released.borrow_mut().push(id),
        }
    }

    fn collect_released(&self) {
        let released = std::mem::take(&mut *self.released.borrow_mut());
        if released.is_empty() {
            return;
        }
        let mut scheduler = self.scheduler.borrow_mut();
        let mut registry = self.registry.borrow_mut();
        for id in released {
            scheduler.remove_node(id);
            registry.remove(&id);
        }
    }
}

/// Marks a pass as running for as long as it lives.
struct PassGuard<'a> {
    inner: &'a RuntimeInner,
}

impl<'a> PassGuard<'a> {
    fn enter(inner: &'a RuntimeInner) -> Self {
        debug_assert!(!inner.propagating.get(), "nested propagation pass");
        inner.propagating.set(true);
        inner.passes.set(inner.passes.get() + 1);
        Self { inner }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.inner.propagating.set(false);
        self.inner.collect_released();
    }
}

/// The propagation context of one signal graph.
///
/// Cheap to clone; clones share the same graph.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                scheduler: RefCell::new(UpdateScheduler::new()),
                registry: RefCell::new(HashMap::new()),
                queue: RefCell::new(VecDeque::new()),
                seeds: RefCell::new(Vec::new()),
                released: RefCell::new(Vec::new()),
                scopes: RefCell::new(Vec::new()),
                propagating: Cell::new(false),
                passes: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create a new root signal and the handle that feeds it.
    pub fn emitter<T: Clone + 'static>(&self) -> Emitter<T> {
        Emitter::new(self.new_signal(NodeKind::Source, &[], None, |_| None))
    }

    /// Deliver the initial values of seeded signals created since the last
    /// flush.
    ///
    /// Called automatically at the end of a component invocation, before an
    /// emission and when an observer attaches.
    pub fn flush(&self) -> Result<(), ReactiveError> {
        let seeds = std::mem::take(&mut *self.inner.seeds.borrow_mut());
        if seeds.is_empty() {
            return Ok(());
        }
        self.dispatch(Pending::Seed(seeds))
    }

    /// Whether a propagation pass is running.
    pub fn is_propagating(&self) -> bool {
        self.inner.propagating.get()
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.collect_released();
        self.inner.scheduler.borrow().node_count()
    }

    /// Number of live subscriptions in the graph.
    pub fn edge_count(&self) -> usize {
        self.inner.collect_released();
        self.inner.scheduler.borrow().edge_count()
    }

    /// Number of propagation passes run so far.
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.get()
    }

    // ------------------------------------------------------------------
    // Graph construction
    // ------------------------------------------------------------------

    /// Register a new cell and its node.
    ///
    /// `build` receives the node's own ID and returns its operator.
    pub(crate) fn new_signal<T, B>(
        &self,
        kind: NodeKind,
        upstreams: &[NodeId],
        initial: Option<T>,
        build: B,
    ) -> Signal<T>
    where
        T: Clone + 'static,
        B: FnOnce(NodeId) -> Option<Operator<T>>,
    {
        let node = Node::new(kind);
        let id = node.id();
        let cell = Rc::new(SignalCell::new(id, Rc::downgrade(&self.inner), initial));
        if let Some(operator) = build(id) {
            cell.set_operator(operator);
        }

        self.inner.scheduler.borrow_mut().add_node(node);
        for &upstream in upstreams {
            self.attach(upstream, id);
        }

        let erased: Rc<dyn AnyNode> = cell.clone();
        self.inner
            .registry
            .borrow_mut()
            .insert(id, Rc::downgrade(&erased));
        if let Some(Some(scope)) = self.inner.scopes.borrow_mut().last_mut() {
            scope.push(Rc::downgrade(&erased));
        }
        if kind == NodeKind::Seeded {
            self.inner.seeds.borrow_mut().push(id);
        }

        Signal {
            cell,
            runtime: self.clone(),
        }
    }

    /// Create a derived signal from an operator over `upstreams`.
    pub(crate) fn derive<T, F>(&self, kind: NodeKind, upstreams: &[NodeId], operator: F) -> Signal<T>
    where
        T: Clone + 'static,
        F: FnMut() -> Result<Emissions<T>, BoxError> + 'static,
    {
        self.new_signal(kind, upstreams, None, |_| Some(Box::new(operator)))
    }

    /// Allocate an unbound signal. It emits nothing until bound.
    pub(crate) fn placeholder<T: Clone + 'static>(&self) -> Signal<T> {
        self.new_signal(NodeKind::Placeholder, &[], None, |_| None)
    }

    /// Subscribe `downstream` to `upstream`.
    pub(crate) fn attach(&self, upstream: NodeId, downstream: NodeId) {
        let inserted = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            // A released upstream simply never triggers.
            if !scheduler.contains(upstream) || !scheduler.contains(downstream) {
                return;
            }
            scheduler.add_edge(upstream, downstream)
        };
        if self.inner.config.check_invariants {
            assert!(
                inserted,
                "duplicate subscription {upstream} -> {downstream}"
            );
        }
    }

    pub(crate) fn attach_deferred(&self, upstream: NodeId, downstream: NodeId) {
        self.inner
            .scheduler
            .borrow_mut()
            .add_deferred_edge(upstream, downstream);
    }

    pub(crate) fn set_label(&self, id: NodeId, label: Rc<str>) {
        if let Some(node) = self.inner.scheduler.borrow_mut().get_node_mut(id) {
            node.set_label(label);
        }
    }

    pub(crate) fn label(&self, id: NodeId) -> Option<String> {
        self.inner
            .scheduler
            .borrow()
            .get_node(id)
            .and_then(|node| node.label().map(str::to_owned))
    }

    pub(crate) fn display_name(&self, id: NodeId) -> String {
        match self.inner.scheduler.try_borrow() {
            Ok(scheduler) => scheduler.display_names(&[id]).remove(0),
            Err(_) => id.to_string(),
        }
    }

    pub(crate) fn dependent_count(&self, id: NodeId) -> usize {
        self.inner
            .scheduler
            .borrow()
            .get_node(id)
            .map_or(0, |node| node.dependents().len())
    }

    fn node(&self, id: NodeId) -> Option<Rc<dyn AnyNode>> {
        self.inner
            .registry
            .borrow()
            .get(&id)
            .and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Commit `value` on `cell` and propagate it.
    pub(crate) fn emit_into<T: Clone + 'static>(
        &self,
        cell: Rc<SignalCell<T>>,
        value: T,
    ) -> Result<(), ReactiveError> {
        self.flush()?;
        self.dispatch(Pending::Emit(Box::new(move || {
            cell.commit(value);
            cell as Rc<dyn AnyNode>
        })))
    }

    /// Recompute `id` in a pass of its own, queued if a pass is running.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<(), ReactiveError> {
        self.dispatch(Pending::Refresh(id))
    }

    /// Run `pending` now, or queue it behind the running pass.
    ///
    /// The outermost call drains the queue before returning, so every
    /// external trigger settles completely.
    pub(crate) fn dispatch(&self, pending: Pending) -> Result<(), ReactiveError> {
        if self.is_propagating() {
            self.inner.queue.borrow_mut().push_back(pending);
            return Ok(());
        }

        let limit = self.inner.config.max_passes;
        let mut next = Some(pending);
        let mut passes = 0usize;

        while let Some(pending) = next {
            passes += 1;
            if passes > limit {
                self.inner.queue.borrow_mut().clear();
                warn!(limit, "propagation did not settle");
                return Err(ReactiveError::PassLimit { limit });
            }

            if let Err(err) = self.run_pass(pending) {
                self.inner.queue.borrow_mut().clear();
                warn!(error = %err, "propagation pass aborted");
                return Err(err);
            }

            next = self.inner.queue.borrow_mut().pop_front();
        }
        Ok(())
    }

    fn run_pass(&self, pending: Pending) -> Result<(), ReactiveError> {
        let _pass = PassGuard::enter(&self.inner);
        let mut touched = Vec::new();
        let result = self.visit(pending, &mut touched);
        for node in &touched {
            node.end_pass();
        }
        result
    }

    fn visit(
        &self,
        pending: Pending,
        touched: &mut Vec<Rc<dyn AnyNode>>,
    ) -> Result<(), ReactiveError> {
        let mut fired: HashSet<NodeId> = HashSet::new();
        let mut roots = Vec::new();

        match pending {
            Pending::Emit(commit) => {
                let node = commit();
                roots.push(node.id());
                fired.insert(node.id());
                touched.push(node);
            }
            Pending::Refresh(id) => {
                roots.push(id);
                if let Some(node) = self.node(id) {
                    if self.recompute(&node)? {
                        fired.insert(id);
                    }
                    touched.push(node);
                }
            }
            Pending::Seed(ids) => {
                for id in ids {
                    let Some(node) = self.node(id) else { continue };
                    if node.fire_current() {
                        fired.insert(id);
                    }
                    roots.push(id);
                    touched.push(node);
                }
            }
        }

        if fired.is_empty() {
            return Ok(());
        }

        let order = self.inner.scheduler.borrow().pass_order(&roots)?;
        debug!(roots = roots.len(), reachable = order.len(), "propagation pass");

        for id in order {
            if roots.contains(&id) {
                continue;
            }

            let triggered = self
                .inner
                .scheduler
                .borrow()
                .get_node(id)
                .is_some_and(|node| node.dependencies().iter().any(|dep| fired.contains(dep)));
            if !triggered {
                continue;
            }

            let Some(node) = self.node(id) else { continue };
            trace!(node = %id, "visit");
            let emitted = self.recompute(&node)?;
            if emitted {
                fired.insert(id);
                touched.push(node);
            }
        }

        debug!(fired = fired.len(), "propagation pass settled");
        Ok(())
    }

    fn recompute(&self, node: &Rc<dyn AnyNode>) -> Result<bool, ReactiveError> {
        node.recompute().map_err(|source| ReactiveError::Combinator {
            node: self.display_name(node.id()),
            source,
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("propagating", &self.is_propagating())
            .field("passes", &self.pass_count())
            .field("queued", &self.inner.queue.borrow().len())
            .finish()
    }
}
