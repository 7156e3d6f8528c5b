//! Dynamic Subscriptions
//!
//! A derived signal normally keeps the upstreams it was created with. The
//! functions here let a node swap its upstream set while the graph is live,
//! which is what `flat_map` needs to follow a changing collection of inner
//! signals.
//!
//! Rebinding detaches the old upstreams before the new ones are attached,
//! and then recomputes the node in a pass of its own. Values of removed
//! upstreams can therefore never reach the node again.

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::debug;

use super::combinators::combine_latest;
use super::runtime::Runtime;
use super::signal::Signal;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind};

impl Runtime {
    /// Replace the upstreams of `node`.
    ///
    /// Every dependency not listed in `anchors` is detached, then `node` is
    /// subscribed to each of `upstreams` and recomputed. The recomputation
    /// is queued if a pass is running.
    pub(crate) fn rebind(
        &self,
        node: NodeId,
        anchors: &[NodeId],
        upstreams: &[NodeId],
    ) -> Result<(), ReactiveError> {
        let detached = self
            .inner
            .scheduler
            .borrow_mut()
            .rebind(node, anchors, upstreams);
        debug!(
            node = %node,
            detached = detached.len(),
            attached = upstreams.len(),
            "rebind"
        );
        self.refresh(node)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Follow the set of signals `project` derives from each emission.
    ///
    /// Every emission of this signal replaces the observed set. The result
    /// emits the current values of the observed signals, in order, whenever
    /// one of them emits or the set changes. It stays silent while any of
    /// them has no value. An empty set emits an empty `Vec`. An inner signal
    /// that emits several times in one pass produces one `Vec` per value.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tangle_core::reactive::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let a = rt.emitter::<i32>();
    /// let b = rt.emitter::<i32>();
    /// let pick = rt.emitter::<bool>();
    ///
    /// let (sa, sb) = (a.signal(), b.signal());
    /// let chosen = pick
    ///     .signal()
    ///     .flat_map(move |both| if *both { vec![sa.clone(), sb.clone()] } else { vec![sa.clone()] });
    ///
    /// a.emit(1).unwrap();
    /// b.emit(2).unwrap();
    /// pick.emit(true).unwrap();
    /// assert_eq!(chosen.current(), Some(vec![1, 2]));
    ///
    /// pick.emit(false).unwrap();
    /// b.emit(3).unwrap();
    /// assert_eq!(chosen.current(), Some(vec![1]));
    /// ```
    pub fn flat_map<U, F>(&self, mut project: F) -> Signal<Vec<U>>
    where
        U: Clone + 'static,
        F: FnMut(&T) -> Vec<Signal<U>> + 'static,
    {
        let outer = self.clone();
        let runtime = self.runtime.clone();
        self.runtime
            .new_signal(NodeKind::Derived, &[self.id()], None, move |id| {
                let mut inners: Vec<Signal<U>> = Vec::new();
                Some(Box::new(move || {
                    if let Some(value) = outer.fired_values().pop() {
                        let mut seen = IndexSet::new();
                        inners = project(&value)
                            .into_iter()
                            .filter(|inner| seen.insert(inner.id()))
                            .collect();
                        let upstreams: Vec<NodeId> = seen.into_iter().collect();
                        // The combined value is emitted by the refresh pass.
                        runtime.rebind(id, &[outer.id()], &upstreams)?;
                        return Ok(SmallVec::new());
                    }

                    Ok(combine_latest(&inners))
                }))
            })
    }
}
