//! Combinator Library
//!
//! Every combinator derives a new signal from existing ones. The derived
//! signal subscribes to its inputs and runs its operator whenever one of them
//! emits during a propagation pass.
//!
//! # Emission rules
//!
//! - `map`, `filter`, `reduce`, `merge`, `start_with` and `sample_on` handle
//!   every emission of their input, in order.
//! - `latest` and its variants emit once per pass with the settled values
//!   of all inputs when several inputs fire together. When a single input
//!   fires several times in one pass, they emit once for each of its values.
//! - A derived signal never reads its inputs at construction time. Use
//!   [`start_with`](Signal::start_with) to give it an initial value.

use indexmap::IndexSet;
use smallvec::{smallvec, SmallVec};

use super::runtime::Runtime;
use super::signal::{Emissions, Signal};
use crate::error::BoxError;
use crate::graph::{NodeId, NodeKind};

impl<T: Clone + 'static> Signal<T> {
    /// Emit `f(v)` for every `v` this signal emits.
    pub fn map<U, F>(&self, mut f: F) -> Signal<U>
    where
        U: Clone + 'static,
        F: FnMut(&T) -> U + 'static,
    {
        let input = self.clone();
        self.runtime.derive(NodeKind::Derived, &[self.id()], move || {
            Ok(input.fired_values().iter().map(&mut f).collect())
        })
    }

    /// Like [`map`](Self::map), for functions that can fail.
    ///
    /// An error aborts the pass and is returned from the `emit` that
    /// started it.
    pub fn try_map<U, E, F>(&self, mut f: F) -> Signal<U>
    where
        U: Clone + 'static,
        E: Into<BoxError>,
        F: FnMut(&T) -> Result<U, E> + 'static,
    {
        let input = self.clone();
        self.runtime.derive(NodeKind::Derived, &[self.id()], move || {
            let mut out = Emissions::new();
            for value in input.fired_values() {
                out.push(f(&value).map_err(Into::into)?);
            }
            Ok(out)
        })
    }

    /// Forward the emissions for which `predicate` holds.
    ///
    /// A rejected value produces no emission at all.
    pub fn filter<F>(&self, mut predicate: F) -> Signal<T>
    where
        F: FnMut(&T) -> bool + 'static,
    {
        let input = self.clone();
        self.runtime.derive(NodeKind::Derived, &[self.id()], move || {
            Ok(input
                .fired_values()
                .into_iter()
                .filter(|value| predicate(value))
                .collect())
        })
    }

    pub fn try_filter<E, F>(&self, mut predicate: F) -> Signal<T>
    where
        E: Into<BoxError>,
        F: FnMut(&T) -> Result<bool, E> + 'static,
    {
        let input = self.clone();
        self.runtime.derive(NodeKind::Derived, &[self.id()], move || {
            let mut out = Emissions::new();
            for value in input.fired_values() {
                if predicate(&value).map_err(Into::into)? {
                    out.push(value);
                }
            }
            Ok(out)
        })
    }

    /// Fold every emission into an accumulator and emit the new accumulator.
    ///
    /// The accumulator starts at `initial` and is not emitted until the
    /// first input arrives.
    pub fn reduce<A, F>(&self, initial: A, mut f: F) -> Signal<A>
    where
        A: Clone + 'static,
        F: FnMut(&A, &T) -> A + 'static,
    {
        self.try_reduce(initial, move |acc, value| Ok::<_, BoxError>(f(acc, value)))
    }

    /// Like [`reduce`](Self::reduce), for folds that can fail. A failed step
    /// leaves the accumulator as it was before the pass, discarding the
    /// steps of that pass that had already succeeded.
    pub fn try_reduce<A, E, F>(&self, initial: A, mut f: F) -> Signal<A>
    where
        A: Clone + 'static,
        E: Into<BoxError>,
        F: FnMut(&A, &T) -> Result<A, E> + 'static,
    {
        let input = self.clone();
        let mut acc = initial;
        self.runtime.derive(NodeKind::Derived, &[self.id()], move || {
            let mut out = Emissions::new();
            let mut next = acc.clone();
            for value in input.fired_values() {
                next = f(&next, &value).map_err(Into::into)?;
                out.push(next.clone());
            }
            acc = next;
            Ok(out)
        })
    }

    /// Emit `initial` first, then every emission of this signal.
    ///
    /// `current` holds `initial` immediately. Dependents receive it with the
    /// next seed flush (see [`Runtime::flush`]).
    pub fn start_with(&self, initial: T) -> Signal<T> {
        let input = self.clone();
        self.runtime
            .new_signal(NodeKind::Seeded, &[self.id()], Some(initial), |_| {
                Some(Box::new(move || Ok(input.fired_values())))
            })
    }

    /// Emit this signal's value each time `trigger` emits.
    ///
    /// The trigger's payload is ignored. The value is read as of the start
    /// of the pass, so no subscription to this signal is made. Nothing is
    /// emitted while this signal has no value.
    pub fn sample_on<U: Clone + 'static>(&self, trigger: &Signal<U>) -> Signal<T> {
        let value = self.clone();
        let trigger_input = trigger.clone();
        self.runtime
            .derive(NodeKind::Derived, &[trigger.id()], move || {
                let Some(sampled) = value.sample() else {
                    return Ok(SmallVec::new());
                };
                Ok((0..trigger_input.fired_count())
                    .map(|_| sampled.clone())
                    .collect())
            })
    }

    /// Merge this signal with `other`. See [`Runtime::merge`].
    pub fn merge(&self, other: &Signal<T>) -> Signal<T> {
        self.runtime.merge(&[self.clone(), other.clone()])
    }

    /// Pair the latest values of this signal and `other`. See [`latest`].
    pub fn latest<U: Clone + 'static>(&self, other: &Signal<U>) -> Signal<(T, U)> {
        latest(self, other)
    }
}

impl Runtime {
    /// Emit every emission of every input.
    ///
    /// Emissions of inputs that fire in the same pass are delivered one
    /// after the other, in the order the inputs are given.
    pub fn merge<T: Clone + 'static>(&self, inputs: &[Signal<T>]) -> Signal<T> {
        let mut seen = IndexSet::new();
        let inputs: Vec<Signal<T>> = inputs
            .iter()
            .filter(|input| seen.insert(input.id()))
            .cloned()
            .collect();
        let ids: Vec<NodeId> = seen.into_iter().collect();

        self.derive(NodeKind::Derived, &ids, move || {
            let mut out = Emissions::new();
            for input in &inputs {
                out.extend(input.fired_values());
            }
            Ok(out)
        })
    }

    /// Emit the latest value of every input, in input order, whenever any
    /// of them emits.
    ///
    /// Nothing is emitted until every input has a value. Over zero inputs
    /// the signal never emits.
    pub fn latest_all<T: Clone + 'static>(&self, inputs: Vec<Signal<T>>) -> Signal<Vec<T>> {
        let mut seen = IndexSet::new();
        let ids: Vec<NodeId> = inputs
            .iter()
            .map(Signal::id)
            .filter(|id| seen.insert(*id))
            .collect();

        self.derive(NodeKind::Derived, &ids, move || Ok(combine_latest(&inputs)))
    }
}

/// The latest values of `inputs`, one row per emission.
///
/// Empty until every input has a value.
pub(super) fn combine_latest<T: Clone + 'static>(inputs: &[Signal<T>]) -> Emissions<Vec<T>> {
    let Some(settled) = inputs
        .iter()
        .map(Signal::current)
        .collect::<Option<Vec<T>>>()
    else {
        return Emissions::new();
    };
    match sole_burst(inputs.iter().map(Signal::fired_count)) {
        Some(at) => inputs[at]
            .fired_values()
            .into_iter()
            .map(|value| {
                let mut row = settled.clone();
                row[at] = value;
                row
            })
            .collect(),
        None => smallvec![settled],
    }
}

/// Position of the only input that fired this pass, if it fired more than
/// once.
fn sole_burst(counts: impl IntoIterator<Item = usize>) -> Option<usize> {
    let mut fired = counts.into_iter().enumerate().filter(|(_, n)| *n > 0);
    match (fired.next(), fired.next()) {
        (Some((at, n)), None) if n > 1 => Some(at),
        _ => None,
    }
}

/// Emit `(a, b)` with the latest value of both inputs whenever either
/// emits, once both have a value.
pub fn latest<A, B>(a: &Signal<A>, b: &Signal<B>) -> Signal<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    let (left, right) = (a.clone(), b.clone());
    a.runtime
        .derive(NodeKind::Derived, &distinct(&[a.id(), b.id()]), move || {
            let (Some(l), Some(r)) = (left.current(), right.current()) else {
                return Ok(SmallVec::new());
            };
            Ok(match sole_burst([left.fired_count(), right.fired_count()]) {
                Some(0) => left
                    .fired_values()
                    .into_iter()
                    .map(|l| (l, r.clone()))
                    .collect(),
                Some(_) => right
                    .fired_values()
                    .into_iter()
                    .map(|r| (l.clone(), r))
                    .collect(),
                None => smallvec![(l, r)],
            })
        })
}

/// Three-input form of [`latest`].
pub fn latest3<A, B, C>(a: &Signal<A>, b: &Signal<B>, c: &Signal<C>) -> Signal<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    let (first, second, third) = (a.clone(), b.clone(), c.clone());
    a.runtime.derive(
        NodeKind::Derived,
        &distinct(&[a.id(), b.id(), c.id()]),
        move || {
            let (Some(x), Some(y), Some(z)) = (first.current(), second.current(), third.current())
            else {
                return Ok(SmallVec::new());
            };
            let counts = [first.fired_count(), second.fired_count(), third.fired_count()];
            Ok(match sole_burst(counts) {
                Some(0) => first
                    .fired_values()
                    .into_iter()
                    .map(|x| (x, y.clone(), z.clone()))
                    .collect(),
                Some(1) => second
                    .fired_values()
                    .into_iter()
                    .map(|y| (x.clone(), y, z.clone()))
                    .collect(),
                Some(_) => third
                    .fired_values()
                    .into_iter()
                    .map(|z| (x.clone(), y.clone(), z))
                    .collect(),
                None => smallvec![(x, y, z)],
            })
        },
    )
}

fn distinct(ids: &[NodeId]) -> Vec<NodeId> {
    let set: IndexSet<NodeId> = ids.iter().copied().collect();
    set.into_iter().collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
