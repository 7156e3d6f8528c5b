//! Component Wiring
//!
//! A component is a named set of sink definitions. Invoking it with props
//! and sources produces an [`Instance`]: the linked sink signals.
//!
//! # Wiring
//!
//! Definitions may refer to any sink of the same component, including ones
//! declared later and their own. Invocation therefore runs in two phases:
//!
//! 1. A placeholder signal is allocated for every declared key.
//! 2. Every definition runs against the complete placeholder mapping and
//!    returns the signal for its key.
//!
//! Each placeholder is then bound to the signal returned for it. When the
//! binding would close a cycle in the propagation graph, it becomes a
//! deferred link instead: emissions reach the placeholder in a follow-up
//! pass. A reference cycle that no emission can ever enter is rejected with
//! [`WiringError::ValueCycle`].
//!
//! # Lifetime
//!
//! Every node built during invocation, including nodes of child components
//! invoked by the definitions, is owned by the instance and released by
//! [`Instance::dispose`].

mod sinks;

pub use sinks::{Sinks, Sources};

use std::any::type_name;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::WiringError;
use crate::graph::NodeId;
use crate::reactive::{Owner, Runtime, Signal};
use sinks::AnySignal;

/// One declared sink of a component with props `P`.
trait SinkDecl<P> {
    fn key(&self) -> &str;

    fn placeholder(&self, rt: &Runtime, label: String) -> AnySignal;

    fn define(
        &self,
        rt: &Runtime,
        props: &P,
        sources: &Sources,
        sinks: &Sinks,
    ) -> Result<AnySignal, WiringError>;

    /// Alias `placeholder` to `actual`. Both were produced by this
    /// declaration.
    fn bind(&self, placeholder: &AnySignal, actual: &AnySignal, deferred: bool);
}

type Define<P, T> = dyn Fn(&Runtime, &P, &Sources, &Sinks) -> Result<Signal<T>, WiringError>;

struct TypedSink<P, T> {
    key: String,
    define: Box<Define<P, T>>,
}

impl<P, T: Clone + 'static> SinkDecl<P> for TypedSink<P, T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn placeholder(&self, rt: &Runtime, label: String) -> AnySignal {
        AnySignal::new(rt.placeholder::<T>().labelled(label))
    }

    fn define(
        &self,
        rt: &Runtime,
        props: &P,
        sources: &Sources,
        sinks: &Sinks,
    ) -> Result<AnySignal, WiringError> {
        (self.define)(rt, props, sources, sinks).map(AnySignal::new)
    }

    fn bind(&self, placeholder: &AnySignal, actual: &AnySignal, deferred: bool) {
        let (Some(placeholder), Some(actual)) = (placeholder.downcast::<T>(), actual.downcast::<T>())
        else {
            debug_assert!(false, "sink `{}` changed type during wiring", self.key);
            return;
        };
        if deferred {
            placeholder.bind_deferred(&actual);
        } else {
            placeholder.bind_to(&actual);
        }
    }
}

/// A reusable component declaration.
///
/// # Example
///
/// ```rust
/// use tangle_core::component::{Component, Sources};
/// use tangle_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let ticks = rt.emitter::<u32>();
///
/// // `total` is read by `label` before it is declared.
/// let counter = Component::<u32>::new("counter")
///     .sink("label", |_, _, _, sinks| {
///         Ok(sinks.get::<u32>("total")?.map(|n| format!("{n} clicks")))
///     })
///     .sink("total", |_, start, sources, _| {
///         let start = *start;
///         Ok(sources.signal::<u32>("ticks")?.reduce(start, |acc, _| acc + 1))
///     });
///
/// let sources = Sources::new().with_signal("ticks", ticks.signal());
/// let instance = counter.invoke(&rt, &10, &sources).unwrap();
/// ticks.emit(0).unwrap();
/// assert_eq!(instance.sink::<String>("label").unwrap().current().as_deref(), Some("11 clicks"));
/// ```
pub struct Component<P> {
    name: Rc<str>,
    sinks: Vec<Rc<dyn SinkDecl<P>>>,
}

impl<P: 'static> Component<P> {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            sinks: Vec::new(),
        }
    }

    /// Declare a sink.
    ///
    /// `define` receives the runtime, the props, the sources and the
    /// complete sink mapping. The first declared sink is the view.
    pub fn sink<T, F>(mut self, key: impl Into<String>, define: F) -> Self
    where
        T: Clone + 'static,
        F: Fn(&Runtime, &P, &Sources, &Sinks) -> Result<Signal<T>, WiringError> + 'static,
    {
        self.sinks.push(Rc::new(TypedSink {
            key: key.into(),
            define: Box::new(define),
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared sink keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sinks.iter().map(|decl| decl.key())
    }

    /// Build a new instance.
    ///
    /// On error everything built so far is disposed.
    pub fn invoke(&self, rt: &Runtime, props: &P, sources: &Sources) -> Result<Instance, WiringError> {
        self.check_keys()?;

        let (wired, owner) = rt.owned(|| self.wire(rt, props, sources));
        let sinks = match wired {
            Ok(sinks) => sinks,
            Err(err) => {
                owner.dispose();
                return Err(err);
            }
        };

        // Deliver initial values of start_with nodes to the new graph.
        if let Err(err) = rt.flush() {
            owner.dispose();
            return Err(err.into());
        }

        Ok(Instance {
            inner: Rc::new(InstanceInner {
                name: self.name.clone(),
                sinks,
                owner,
            }),
        })
    }

    fn check_keys(&self) -> Result<(), WiringError> {
        let mut seen = HashSet::new();
        for key in self.keys() {
            if !seen.insert(key) {
                return Err(WiringError::DuplicateSink {
                    component: self.name.to_string(),
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }

    fn wire(&self, rt: &Runtime, props: &P, sources: &Sources) -> Result<Sinks, WiringError> {
        let mut placeholders = Sinks::new(self.name.clone());
        for decl in &self.sinks {
            let label = format!("{}.{}", self.name, decl.key());
            placeholders.insert(decl.key().to_owned(), decl.placeholder(rt, label));
        }

        let mut actuals = Vec::with_capacity(self.sinks.len());
        for decl in &self.sinks {
            actuals.push(decl.define(rt, props, sources, &placeholders)?);
        }

        let mut deferred = Vec::new();
        for (decl, actual) in self.sinks.iter().zip(&actuals) {
            let Some(placeholder) = placeholders.get_erased(decl.key()) else {
                continue;
            };
            let closes_cycle = rt
                .inner
                .scheduler
                .borrow()
                .reaches(placeholder.id(), actual.id());
            decl.bind(placeholder, actual, closes_cycle);
            if closes_cycle {
                deferred.push(placeholder.id());
            }
        }

        if rt.config().detect_value_cycles {
            self.check_value_cycles(rt, &placeholders, &deferred)?;
        }

        debug!(
            component = %self.name,
            sinks = placeholders.len(),
            deferred = deferred.len(),
            "component wired"
        );
        Ok(placeholders)
    }

    /// Reject groups of sinks that can only be triggered by each other.
    fn check_value_cycles(
        &self,
        rt: &Runtime,
        placeholders: &Sinks,
        deferred: &[NodeId],
    ) -> Result<(), WiringError> {
        let scheduler = rt.inner.scheduler.borrow();
        for &id in deferred {
            let region = scheduler.region(id);
            if scheduler.region_is_live(&region) {
                continue;
            }

            let keys: Vec<String> = placeholders
                .erased()
                .filter(|(_, signal)| region.contains(&signal.id()))
                .map(|(key, _)| key.to_owned())
                .collect();
            warn!(component = %self.name, keys = ?keys, "value cycle");
            return Err(WiringError::ValueCycle {
                component: self.name.to_string(),
                keys,
            });
        }
        Ok(())
    }
}

impl<P> Clone for Component<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sinks: self.sinks.clone(),
        }
    }
}

impl<P> fmt::Debug for Component<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("sinks", &self.sinks.iter().map(|decl| decl.key()).collect::<Vec<_>>())
            .finish()
    }
}

struct InstanceInner {
    name: Rc<str>,
    sinks: Sinks,
    owner: Owner,
}

/// The linked sinks of one component invocation.
///
/// Cheap to clone; clones refer to the same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn sinks(&self) -> &Sinks {
        &self.inner.sinks
    }

    pub fn sink<T: Clone + 'static>(&self, key: &str) -> Result<Signal<T>, WiringError> {
        self.inner.sinks.get(key)
    }

    /// The first declared sink.
    pub fn view<V: Clone + 'static>(&self) -> Result<Signal<V>, WiringError> {
        let key = self
            .inner
            .sinks
            .first_key()
            .ok_or_else(|| WiringError::MissingSink {
                component: self.inner.name.to_string(),
                key: format!("<view: {}>", type_name::<V>()),
            })?;
        self.inner.sinks.get(key)
    }

    /// Release every node built by this instance and its children.
    pub fn dispose(&self) {
        debug!(component = %self.inner.name, "dispose instance");
        self.inner.owner.dispose();
    }

    /// Number of nodes of this instance still in the graph.
    pub fn live_count(&self) -> usize {
        self.inner.owner.live_count()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.inner.name)
            .field("sinks", &self.inner.sinks.keys().collect::<Vec<_>>())
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::cell::RefCell;

    fn record<T: Clone + 'static>(
        signal: &Signal<T>,
    ) -> (Rc<RefCell<Vec<T>>>, crate::reactive::Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = signal
            .observe(move |v: &T| sink.borrow_mut().push(v.clone()))
            .unwrap();
        (seen, sub)
    }

    #[test]
    fn forward_reference_is_bound_immediately() {
        let rt = Runtime::new();
        let input = rt.emitter::<i32>();
        let sources = Sources::new().with_signal("input", input.signal());

        let doubler = Component::<()>::new("doubler")
            .sink("view", |_, _, _, sinks| {
                Ok(sinks.get::<i32>("doubled")?.map(|v| format!("<{v}>")))
            })
            .sink("doubled", |_, _, sources, _| {
                Ok(sources.signal::<i32>("input")?.map(|v| v * 2))
            });

        let instance = doubler.invoke(&rt, &(), &sources).unwrap();
        let (views, _sub) = record(&instance.view::<String>().unwrap());
        input.emit(4).unwrap();
        assert_eq!(*views.borrow(), vec!["<8>".to_string()]);
    }

    #[test]
    fn mutual_reference_through_filter_settles() {
        let rt = Runtime::new();
        let trigger = rt.emitter::<i32>();
        let sources = Sources::new().with_signal("trigger", trigger.signal());

        let pair = Component::<()>::new("pair")
            .sink("a", |rt, _, sources, sinks| {
                let trigger = sources.signal::<i32>("trigger")?;
                let echoed = sinks.get::<i32>("b")?.map(|x| x * 10);
                Ok(rt.merge(&[trigger, echoed]))
            })
            .sink("b", |_, _, _, sinks| {
                Ok(sinks.get::<i32>("a")?.filter(|x| *x < 10).map(|x| x + 1))
            });

        let instance = pair.invoke(&rt, &(), &sources).unwrap();
        let (a, _sa) = record(&instance.sink::<i32>("a").unwrap());
        let (b, _sb) = record(&instance.sink::<i32>("b").unwrap());

        trigger.emit(1).unwrap();
        assert_eq!(*a.borrow(), vec![1, 20]);
        assert_eq!(*b.borrow(), vec![2]);
    }

    #[test]
    fn value_cycle_is_rejected() {
        let rt = Runtime::new();
        let looped = Component::<()>::new("looped")
            .sink("a", |_, _, _, sinks| Ok(sinks.get::<i32>("b")?.map(|x| x + 1)))
            .sink("b", |_, _, _, sinks| Ok(sinks.get::<i32>("a")?.map(|x| x * 2)));

        let err = looped.invoke(&rt, &(), &Sources::new()).unwrap_err();
        match err {
            WiringError::ValueCycle { component, keys } => {
                assert_eq!(component, "looped");
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn value_cycle_check_can_be_disabled() {
        let rt = Runtime::with_config(RuntimeConfig {
            detect_value_cycles: false,
            ..RuntimeConfig::default()
        });
        let looped = Component::<()>::new("looped")
            .sink("a", |_, _, _, sinks| Ok(sinks.get::<i32>("b")?.map(|x| x + 1)))
            .sink("b", |_, _, _, sinks| Ok(sinks.get::<i32>("a")?.map(|x| x * 2)));

        let instance = looped.invoke(&rt, &(), &Sources::new()).unwrap();
        assert_eq!(instance.sink::<i32>("a").unwrap().current(), None);
        instance.dispose();
    }

    #[test]
    fn seeded_cycle_is_live() {
        let rt = Runtime::new();
        let tick = rt.emitter::<()>();
        let sources = Sources::new().with_signal("tick", tick.signal());

        let counter = Component::<()>::new("counter")
            .sink("count", |_, _, _, sinks| {
                Ok(sinks.get::<u32>("next")?.start_with(0))
            })
            .sink("next", |_, _, sources, sinks| {
                let count = sinks.get::<u32>("count")?;
                Ok(count.sample_on(&sources.signal::<()>("tick")?).map(|n| n + 1))
            });

        let instance = counter.invoke(&rt, &(), &sources).unwrap();
        let (counts, _sub) = record(&instance.sink::<u32>("count").unwrap());
        tick.emit(()).unwrap();
        tick.emit(()).unwrap();
        assert_eq!(*counts.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn missing_sink_fails_construction() {
        let rt = Runtime::new();
        let broken = Component::<()>::new("broken")
            .sink("view", |_, _, _, sinks| sinks.get::<String>("title"));

        let err = broken.invoke(&rt, &(), &Sources::new()).unwrap_err();
        assert!(matches!(err, WiringError::MissingSink { key, .. } if key == "title"));
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn duplicate_sink_is_rejected() {
        let rt = Runtime::new();
        let twice = Component::<()>::new("twice")
            .sink("view", |rt, _, _, _| Ok(rt.emitter::<i32>().signal()))
            .sink("view", |rt, _, _, _| Ok(rt.emitter::<i32>().signal()));

        assert!(matches!(
            twice.invoke(&rt, &(), &Sources::new()),
            Err(WiringError::DuplicateSink { .. })
        ));
    }

    #[test]
    fn dispose_releases_every_node() {
        let rt = Runtime::new();
        let input = rt.emitter::<i32>();
        let sources = Sources::new().with_signal("input", input.signal());
        let component = Component::<()>::new("echo").sink("view", |_, _, sources, _| {
            Ok(sources.signal::<i32>("input")?.map(|v| v + 1))
        });

        let instance = component.invoke(&rt, &(), &sources).unwrap();
        assert_eq!(rt.node_count(), 3);
        assert!(instance.live_count() > 0);

        instance.dispose();
        assert_eq!(instance.live_count(), 0);
        assert_eq!(rt.node_count(), 1);
    }
}
