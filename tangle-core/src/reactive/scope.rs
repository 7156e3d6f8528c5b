//! Ownership Scopes
//!
//! A scope records every node created while it is active. Disposing the
//! scope's [`Owner`] disposes all of them at once, which is how a component
//! instance releases everything it built, including nested children.
//!
//! Scopes nest: nodes recorded by an inner scope are handed to the enclosing
//! one when the inner scope closes, so disposing a parent also releases its
//! children. Work run through [`Runtime::untracked`] is not recorded by any
//! scope.

use std::fmt;
use std::rc::Weak;

use super::runtime::Runtime;
use super::signal::AnyNode;

/// The nodes created inside one scope.
#[derive(Default)]
pub struct Owner {
    nodes: Vec<Weak<dyn AnyNode>>,
}

impl Owner {
    /// Dispose every node of the scope that is still alive.
    pub fn dispose(&self) {
        for node in self.nodes.iter().filter_map(Weak::upgrade) {
            node.dispose();
        }
    }

    /// Number of nodes recorded by the scope that are still alive.
    pub fn live_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|node| !node.is_disposed())
            .count()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("nodes", &self.nodes.len())
            .field("live", &self.live_count())
            .finish()
    }
}

impl Runtime {
    /// Run `f` in a new scope and return its result with the scope's owner.
    pub fn owned<R>(&self, f: impl FnOnce() -> R) -> (R, Owner) {
        self.inner.scopes.borrow_mut().push(Some(Vec::new()));
        let result = f();
        let nodes = self
            .inner
            .scopes
            .borrow_mut()
            .pop()
            .flatten()
            .unwrap_or_default();

        if let Some(Some(parent)) = self.inner.scopes.borrow_mut().last_mut() {
            parent.extend(nodes.iter().cloned());
        }
        (result, Owner { nodes })
    }

    /// Run `f` without recording the nodes it creates in any scope.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.scopes.borrow_mut().push(None);
        let result = f();
        self.inner.scopes.borrow_mut().pop();
        result
    }
}
