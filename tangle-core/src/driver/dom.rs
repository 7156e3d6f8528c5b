//! DOM event sources.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ReactiveError;
use crate::reactive::{Emitter, Runtime, Signal};

/// A raw UI event, as delivered by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    /// Event name, for example `keydown`.
    pub kind: String,
    /// Event-specific fields, for example `{ "key": "a" }`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl DomEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// A field of the payload.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }
}

/// The capability to derive event signals by selector.
pub trait DomSource {
    /// The events named `event` on elements matching `selector`.
    ///
    /// Repeated calls with the same arguments return the same signal.
    fn select(&self, selector: &str, event: &str) -> Signal<DomEvent>;
}

/// An in-memory [`DomSource`]. Events are injected with
/// [`dispatch`](Self::dispatch).
///
/// Selectors are matched literally. A stream lives until it is
/// [released](Self::release), so drivers that select per-item selectors
/// should release them when the item goes away.
pub struct VirtualDom {
    runtime: Runtime,
    emitters: RefCell<IndexMap<(String, String), Emitter<DomEvent>>>,
}

impl VirtualDom {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            emitters: RefCell::new(IndexMap::new()),
        }
    }

    fn emitter(&self, selector: &str, event: &str) -> Emitter<DomEvent> {
        let key = (selector.to_owned(), event.to_owned());
        if let Some(emitter) = self.emitters.borrow().get(&key) {
            return emitter.clone();
        }

        // Event streams outlive the components that select them.
        let emitter = self.runtime.untracked(|| self.runtime.emitter::<DomEvent>());
        let emitter = Emitter::new(emitter.signal().labelled(format!("{selector} @{event}")));
        self.emitters.borrow_mut().insert(key, emitter.clone());
        emitter
    }

    /// Deliver an event to everything that selected `(selector, event)`.
    ///
    /// Events for pairs nobody selected are dropped.
    pub fn dispatch(
        &self,
        selector: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), ReactiveError> {
        let key = (selector.to_owned(), event.to_owned());
        let Some(emitter) = self.emitters.borrow().get(&key).cloned() else {
            trace!(selector, event, "dispatch dropped, no stream");
            return Ok(());
        };
        trace!(selector, event, "dispatch");
        emitter.emit(DomEvent::new(event, payload))
    }

    /// Drop the stream for `(selector, event)` and dispose its signal.
    ///
    /// Returns `false` if nothing had selected the pair. A later `select`
    /// creates a fresh stream.
    pub fn release(&self, selector: &str, event: &str) -> bool {
        let key = (selector.to_owned(), event.to_owned());
        let Some(emitter) = self.emitters.borrow_mut().shift_remove(&key) else {
            return false;
        };
        trace!(selector, event, "release");
        emitter.signal().dispose();
        true
    }

    /// Number of distinct `(selector, event)` pairs selected so far.
    pub fn stream_count(&self) -> usize {
        self.emitters.borrow().len()
    }
}

impl DomSource for VirtualDom {
    fn select(&self, selector: &str, event: &str) -> Signal<DomEvent> {
        self.emitter(selector, event).signal()
    }
}

impl fmt::Debug for VirtualDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDom")
            .field("streams", &self.emitters.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_is_stable() {
        let rt = Runtime::new();
        let dom = VirtualDom::new(&rt);
        let a = dom.select(".input", "keydown");
        let b = dom.select(".input", "keydown");
        let c = dom.select(".input", "keyup");

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(dom.stream_count(), 2);
    }

    #[test]
    fn dispatch_reaches_selectors() {
        let rt = Runtime::new();
        let dom = VirtualDom::new(&rt);
        let keys = dom.select(".input", "keydown");

        dom.dispatch(".input", "keydown", json!({ "key": "a" })).unwrap();
        let event = keys.current().unwrap();
        assert_eq!(event.kind, "keydown");
        assert_eq!(event.field("key"), Some(&json!("a")));
    }

    #[test]
    fn unselected_events_are_dropped() {
        let rt = Runtime::new();
        let dom = VirtualDom::new(&rt);
        let passes = rt.pass_count();

        dom.dispatch(".nothing", "click", json!({})).unwrap();
        assert_eq!(dom.stream_count(), 0);
        assert_eq!(rt.pass_count(), passes);
    }

    #[test]
    fn release_frees_the_stream() {
        let rt = Runtime::new();
        let dom = VirtualDom::new(&rt);
        let old = dom.select("li[data-key=x]", "click");
        let nodes = rt.node_count();

        assert!(dom.release("li[data-key=x]", "click"));
        assert!(!dom.release("li[data-key=x]", "click"));
        assert_eq!(dom.stream_count(), 0);
        assert!(old.is_disposed());
        assert!(rt.node_count() < nodes);

        let fresh = dom.select("li[data-key=x]", "click");
        assert_ne!(fresh.id(), old.id());
        dom.dispatch("li[data-key=x]", "click", json!({})).unwrap();
        assert!(fresh.current().is_some());
        assert!(old.current().is_none());
    }

    #[test]
    fn streams_survive_scope_disposal() {
        let rt = Runtime::new();
        let dom = VirtualDom::new(&rt);
        let (clicks, owner) = rt.owned(|| dom.select("button", "click"));
        owner.dispose();

        dom.dispatch("button", "click", json!({})).unwrap();
        assert!(clicks.current().is_some());
    }
}
