//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a typed value cell that
//! lives in the dependency graph of a [`Runtime`].
//!
//! # How Signals Work
//!
//! 1. Every signal has a node in the runtime's scheduler. The node carries
//!    the topology, the cell carries the value.
//!
//! 2. A derived signal owns an operator. When one of its upstreams emits
//!    during a pass, the runtime runs the operator, which reads the
//!    upstreams' emissions for this pass and returns zero or more values.
//!
//! 3. Every returned value is committed: it becomes `current` and is added
//!    to the cell's emissions for this pass, where dependents read it.
//!
//! 4. At the end of the pass the emissions are cleared.
//!
//! # Memory Layout
//!
//! Each cell consists of:
//! - A node ID (8 bytes)
//! - The current value, a snapshot of the value at pass start, and the
//!   emissions of the running pass
//! - The operator closure, which owns handles to its upstreams
//!
//! Downstream cells keep their upstreams alive, never the other way round.
//! The runtime only holds weak references.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::runtime::{Runtime, RuntimeInner};
use crate::error::{BoxError, ReactiveError};
use crate::graph::{NodeId, NodeKind};

/// Values emitted by one node during one pass.
pub(crate) type Emissions<T> = SmallVec<[T; 1]>;

/// The function that recomputes a derived node.
pub(crate) type Operator<T> = Box<dyn FnMut() -> Result<Emissions<T>, BoxError>>;

/// Type-erased view of a value cell, used by the runtime.
pub(crate) trait AnyNode {
    fn id(&self) -> NodeId;

    /// Run the operator and commit its emissions.
    ///
    /// Returns whether the node emitted.
    fn recompute(&self) -> Result<bool, BoxError>;

    /// Emit the current value as this pass's emission.
    fn fire_current(&self) -> bool;

    /// Forget this pass's emissions.
    fn end_pass(&self);

    /// Detach from the graph and drop the operator.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// The value cell behind a [`Signal`].
pub(crate) struct SignalCell<T> {
    id: NodeId,

    runtime: Weak<RuntimeInner>,

    /// Last committed value. `None` until the first emission.
    current: RefCell<Option<T>>,

    /// Value at the start of the running pass, if it changed during it.
    snapshot: RefCell<Option<Option<T>>>,

    /// Emissions of the running pass, in order.
    fired: RefCell<Emissions<T>>,

    operator: RefCell<Option<Operator<T>>>,

    /// Nodes that live exactly as long as this one (deferred links).
    attached: RefCell<Vec<Rc<dyn AnyNode>>>,

    disposed: Cell<bool>,
}

impl<T: Clone + 'static> SignalCell<T> {
    pub(crate) fn new(id: NodeId, runtime: Weak<RuntimeInner>, initial: Option<T>) -> Self {
        Self {
            id,
            runtime,
            current: RefCell::new(initial),
            snapshot: RefCell::new(None),
            fired: RefCell::new(SmallVec::new()),
            operator: RefCell::new(None),
            attached: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn set_operator(&self, operator: Operator<T>) {
        debug_assert!(
            self.operator.borrow().is_none(),
            "node {} already has an operator",
            self.id
        );
        if !self.disposed.get() {
            *self.operator.borrow_mut() = Some(operator);
        }
    }

    pub(crate) fn has_operator(&self) -> bool {
        self.operator.borrow().is_some()
    }

    pub(crate) fn attach(&self, node: Rc<dyn AnyNode>) {
        self.attached.borrow_mut().push(node);
    }

    /// Make `value` the current value and an emission of this pass.
    pub(crate) fn commit(&self, value: T) {
        {
            let mut snapshot = self.snapshot.borrow_mut();
            if snapshot.is_none() {
                *snapshot = Some(self.current.borrow().clone());
            }
        }
        self.fired.borrow_mut().push(value.clone());
        *self.current.borrow_mut() = Some(value);
    }

    pub(crate) fn set_current(&self, value: Option<T>) {
        *self.current.borrow_mut() = value;
    }

    pub(crate) fn current(&self) -> Option<T> {
        self.current.borrow().clone()
    }

    pub(crate) fn sampled(&self) -> Option<T> {
        match &*self.snapshot.borrow() {
            Some(previous) => previous.clone(),
            None => self.current.borrow().clone(),
        }
    }

    pub(crate) fn fired_values(&self) -> Emissions<T> {
        self.fired.borrow().clone()
    }

    pub(crate) fn fired_count(&self) -> usize {
        self.fired.borrow().len()
    }
}

impl<T: Clone + 'static> AnyNode for SignalCell<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn recompute(&self) -> Result<bool, BoxError> {
        if self.disposed.get() {
            return Ok(false);
        }

        // The operator is taken out while it runs so that user code may
        // dispose or inspect this cell without a borrow conflict.
        let Some(mut operator) = self.operator.borrow_mut().take() else {
            return Ok(false);
        };
        let result = operator();
        if !self.disposed.get() {
            *self.operator.borrow_mut() = Some(operator);
        }

        let emissions = result?;
        let emitted = !emissions.is_empty();
        for value in emissions {
            self.commit(value);
        }
        Ok(emitted)
    }

    fn fire_current(&self) -> bool {
        match self.current() {
            Some(value) => {
                self.fired.borrow_mut().push(value);
                true
            }
            None => false,
        }
    }

    fn end_pass(&self) {
        self.fired.borrow_mut().clear();
        *self.snapshot.borrow_mut() = None;
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        // Dropped outside of the borrows: the closures may own the last
        // handles of other nodes, whose drop re-enters the runtime.
        let operator = self
            .operator
            .try_borrow_mut()
            .ok()
            .and_then(|mut operator| operator.take());
        let attached = std::mem::take(&mut *self.attached.borrow_mut());
        drop(operator);
        for node in &attached {
            node.dispose();
        }
        drop(attached);

        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release(self.id);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl<T> Drop for SignalCell<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release(self.id);
        }
    }
}

/// A reactive signal holding values of type T.
///
/// Handles are cheap to clone and share the same cell. A signal stays in the
/// graph as long as a handle (or a downstream signal) refers to it, or until
/// it is disposed.
///
/// # Example
///
/// ```rust
/// use tangle_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let clicks = rt.emitter::<u32>();
/// let doubled = clicks.signal().map(|n| n * 2);
///
/// clicks.emit(21).unwrap();
/// assert_eq!(doubled.current(), Some(42));
/// ```
pub struct Signal<T> {
    pub(crate) cell: Rc<SignalCell<T>>,
    pub(crate) runtime: Runtime,
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.cell.id
    }

    /// The runtime this signal belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The last emitted value, or `None` if the signal never emitted.
    pub fn current(&self) -> Option<T> {
        self.cell.current()
    }

    /// The value as of the start of the running pass.
    ///
    /// Outside of a pass this is the same as [`current`](Self::current).
    pub fn sample(&self) -> Option<T> {
        self.cell.sampled()
    }

    /// Attach a diagnostic label, used by errors and logs.
    pub fn labelled(self, label: impl Into<Rc<str>>) -> Self {
        self.runtime.set_label(self.id(), label.into());
        self
    }

    pub fn label(&self) -> Option<String> {
        self.runtime.label(self.id())
    }

    /// Number of nodes directly triggered by this signal.
    pub fn subscriber_count(&self) -> usize {
        self.runtime.dependent_count(self.id())
    }

    /// Observe every emission of this signal.
    ///
    /// Pending initial values are delivered first, then `f` receives the
    /// current value (if any) and every later emission until the returned
    /// [`Subscription`] is dropped.
    pub fn observe<F>(&self, mut f: F) -> Result<Subscription, ReactiveError>
    where
        F: FnMut(&T) + 'static,
    {
        self.try_observe(move |value| {
            f(value);
            Ok(())
        })
    }

    /// Like [`observe`](Self::observe), for callbacks that can fail.
    ///
    /// A failure aborts the pass and is returned from the `emit` call that
    /// started it.
    pub fn try_observe<F>(&self, mut f: F) -> Result<Subscription, ReactiveError>
    where
        F: FnMut(&T) -> Result<(), BoxError> + 'static,
    {
        self.runtime.flush()?;

        if let Some(value) = self.current() {
            f(&value).map_err(|source| ReactiveError::Combinator {
                node: self.runtime.display_name(self.id()),
                source,
            })?;
        }

        let upstream = self.clone();
        let observer: Signal<()> =
            self.runtime
                .derive(NodeKind::Observer, &[self.id()], move || {
                    for value in upstream.fired_values() {
                        f(&value)?;
                    }
                    Ok(SmallVec::new())
                });
        Ok(Subscription { observer })
    }

    /// Detach this signal from the graph and drop its operator.
    ///
    /// Dependents stop receiving emissions. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.cell.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }

    pub(crate) fn fired_values(&self) -> Emissions<T> {
        self.cell.fired_values()
    }

    pub(crate) fn fired_count(&self) -> usize {
        self.cell.fired_count()
    }

    pub(crate) fn node(&self) -> Rc<dyn AnyNode> {
        self.cell.clone()
    }

    /// Alias this placeholder to `target`: every emission of `target` is
    /// forwarded within the same pass.
    pub(crate) fn bind_to(&self, target: &Signal<T>) {
        debug_assert!(!self.cell.has_operator(), "placeholder bound twice");
        self.cell.set_current(target.current());

        let upstream = target.clone();
        self.cell
            .set_operator(Box::new(move || Ok(upstream.fired_values())));
        self.runtime.attach(target.id(), self.id());
    }

    /// Alias this placeholder to `target` through a deferred link: every
    /// emission of `target` is re-emitted here in a follow-up pass.
    pub(crate) fn bind_deferred(&self, target: &Signal<T>) {
        self.cell.set_current(target.current());

        let placeholder = Rc::downgrade(&self.cell);
        let upstream = target.clone();
        let runtime = self.runtime.clone();
        let link: Signal<()> =
            self.runtime
                .derive(NodeKind::Observer, &[target.id()], move || {
                    if let Some(cell) = placeholder.upgrade() {
                        for value in upstream.fired_values() {
                            runtime.emit_into(cell.clone(), value)?;
                        }
                    }
                    Ok(SmallVec::new())
                });
        self.cell.attach(link.node());
        self.runtime.attach_deferred(target.id(), self.id());
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("current", &self.current())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// The root handle through which values enter the graph.
///
/// Emitting starts a propagation pass. An emission made while a pass is
/// running is queued and processed after that pass completes.
pub struct Emitter<T> {
    signal: Signal<T>,
}

impl<T: Clone + 'static> Emitter<T> {
    pub(crate) fn new(signal: Signal<T>) -> Self {
        Self { signal }
    }

    /// The signal carrying this emitter's values.
    pub fn signal(&self) -> Signal<T> {
        self.signal.clone()
    }

    /// Emit a value and propagate it through the graph.
    pub fn emit(&self, value: T) -> Result<(), ReactiveError> {
        self.signal
            .runtime
            .emit_into(self.signal.cell.clone(), value)
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Emitter").field(&self.signal).finish()
    }
}

/// Keeps an observer attached. Dropping it disposes the observer.
#[must_use = "dropping a Subscription detaches the observer immediately"]
pub struct Subscription {
    observer: Signal<()>,
}

impl Subscription {
    /// Detach the observer now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.observer.is_disposed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.observer.dispose();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("observer", &self.observer.id())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_sets_current() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let signal = emitter.signal();
        assert_eq!(signal.current(), None);

        emitter.emit(42).unwrap();
        assert_eq!(signal.current(), Some(42));
        assert_eq!(signal.sample(), Some(42));
    }

    #[test]
    fn observer_sees_every_emission() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let _sub = emitter
            .signal()
            .observe(move |v| sink.borrow_mut().push(*v))
            .unwrap();

        emitter.emit(1).unwrap();
        emitter.emit(2).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn observer_replays_current_value() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<&'static str>();
        emitter.emit("ready").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = emitter
            .signal()
            .observe(move |v| sink.borrow_mut().push(*v))
            .unwrap();

        assert_eq!(*seen.borrow(), vec!["ready"]);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let sub = emitter
            .signal()
            .observe(move |v| sink.borrow_mut().push(*v))
            .unwrap();
        assert_eq!(emitter.signal().subscriber_count(), 1);

        emitter.emit(1).unwrap();
        sub.unsubscribe();
        assert_eq!(emitter.signal().subscriber_count(), 0);

        emitter.emit(2).unwrap();
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn failing_observer_surfaces_error() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let _sub = emitter
            .signal()
            .labelled("numbers")
            .try_observe(|v| {
                if *v < 0 {
                    Err("negative".into())
                } else {
                    Ok(())
                }
            })
            .unwrap();

        assert!(emitter.emit(1).is_ok());
        let err = emitter.emit(-1).unwrap_err();
        assert!(matches!(err, ReactiveError::Combinator { .. }));
    }

    #[test]
    fn disposed_signal_stops_propagating() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let doubled = emitter.signal().map(|v| v * 2);

        emitter.emit(1).unwrap();
        doubled.dispose();
        emitter.emit(5).unwrap();

        assert!(doubled.is_disposed());
        assert_eq!(doubled.current(), Some(2));
    }

    #[test]
    fn clone_shares_cell() {
        let rt = Runtime::new();
        let emitter = rt.emitter::<i32>();
        let a = emitter.signal();
        let b = a.clone();

        emitter.emit(7).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(b.current(), Some(7));
    }
}
