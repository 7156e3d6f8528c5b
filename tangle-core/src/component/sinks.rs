//! Typed access to the signals flowing into and out of a component.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::driver::DomSource;
use crate::error::WiringError;
use crate::graph::NodeId;
use crate::reactive::Signal;

/// A signal whose value type has been erased.
#[derive(Clone)]
pub(crate) struct AnySignal {
    id: NodeId,
    signal: Rc<dyn Any>,
    type_name: &'static str,
}

impl AnySignal {
    pub(crate) fn new<T: Clone + 'static>(signal: Signal<T>) -> Self {
        Self {
            id: signal.id(),
            signal: Rc::new(signal),
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn downcast<T: Clone + 'static>(&self) -> Option<Signal<T>> {
        self.signal.downcast_ref::<Signal<T>>().cloned()
    }
}

impl fmt::Debug for AnySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal<{}>({})", self.type_name, self.id)
    }
}

/// The output signals of a component, by key, in declaration order.
///
/// Definition functions receive the complete mapping while the component is
/// still being wired, so a sink can refer to any other sink (or to itself)
/// regardless of the order in which they are declared.
#[derive(Clone)]
pub struct Sinks {
    component: Rc<str>,
    signals: IndexMap<String, AnySignal>,
}

impl Sinks {
    pub(crate) fn new(component: Rc<str>) -> Self {
        Self {
            component,
            signals: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: String, signal: AnySignal) {
        self.signals.insert(key, signal);
    }

    pub(crate) fn get_erased(&self, key: &str) -> Option<&AnySignal> {
        self.signals.get(key)
    }

    pub(crate) fn erased(&self) -> impl Iterator<Item = (&str, &AnySignal)> {
        self.signals.iter().map(|(key, signal)| (key.as_str(), signal))
    }

    /// The sink declared under `key`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Result<Signal<T>, WiringError> {
        let signal = self
            .signals
            .get(key)
            .ok_or_else(|| WiringError::MissingSink {
                component: self.component.to_string(),
                key: key.to_owned(),
            })?;
        signal.downcast().ok_or_else(|| WiringError::SinkType {
            component: self.component.to_string(),
            key: key.to_owned(),
            expected: type_name::<T>(),
        })
    }

    /// The key of the first declared sink, the component's view.
    pub fn first_key(&self) -> Option<&str> {
        self.signals.keys().next().map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.signals.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl fmt::Debug for Sinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sinks")
            .field("component", &self.component)
            .field("signals", &self.signals)
            .finish()
    }
}

/// The inputs supplied by the caller of a component.
///
/// Holds an optional DOM capability, used to derive event signals by
/// selector, and any number of keyed input signals.
#[derive(Clone, Default)]
pub struct Sources {
    dom: Option<Rc<dyn DomSource>>,
    signals: IndexMap<String, AnySignal>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply the DOM capability.
    pub fn with_dom(mut self, dom: Rc<dyn DomSource>) -> Self {
        self.dom = Some(dom);
        self
    }

    /// Supply an input signal under `key`.
    pub fn with_signal<T: Clone + 'static>(mut self, key: impl Into<String>, signal: Signal<T>) -> Self {
        self.signals.insert(key.into(), AnySignal::new(signal));
        self
    }

    pub fn dom(&self) -> Result<&dyn DomSource, WiringError> {
        self.dom.as_deref().ok_or(WiringError::MissingDomSource)
    }

    pub fn signal<T: Clone + 'static>(&self, key: &str) -> Result<Signal<T>, WiringError> {
        let signal = self
            .signals
            .get(key)
            .ok_or_else(|| WiringError::MissingSource {
                key: key.to_owned(),
            })?;
        signal.downcast().ok_or_else(|| WiringError::SourceType {
            key: key.to_owned(),
            expected: type_name::<T>(),
        })
    }
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sources")
            .field("dom", &self.dom.is_some())
            .field("signals", &self.signals)
            .finish()
    }
}
