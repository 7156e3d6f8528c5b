//! Reactive Primitives
//!
//! This module implements the push-based signal engine: value cells, the
//! propagation runtime, the combinator library and dynamic subscriptions.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a time-varying value. It has no value until it first
//! emits; after that [`Signal::current`] holds the last emission. Values
//! enter the graph through an [`Emitter`] and flow to derived signals built
//! with combinators such as [`Signal::map`] or [`Runtime::merge`].
//!
//! ## Propagation
//!
//! One emission starts one propagation pass. The pass visits every affected
//! signal exactly once, in topological order, so a signal reached through
//! two paths from the same root never sees one path updated and the other
//! not. Emissions made during a pass are queued and run after it.
//!
//! ## Observers
//!
//! [`Signal::observe`] attaches a side-effecting callback. It returns a
//! [`Subscription`] that detaches the callback when dropped.
//!
//! ## Ownership
//!
//! [`Runtime::owned`] records every node created inside a closure so that
//! they can be disposed together through the returned [`Owner`].
//!
//! # Implementation Notes
//!
//! There is no ambient runtime. Every signal knows the [`Runtime`] it was
//! created in, and independent runtimes never share nodes.

mod combinators;
mod dynamic;
mod runtime;
mod scope;
mod signal;

pub use combinators::{latest, latest3};
pub use runtime::Runtime;
pub use scope::Owner;
pub use signal::{Emitter, Signal, Subscription};
