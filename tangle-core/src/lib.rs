//! Tangle Core
//!
//! This crate provides the reactive core of the Tangle component framework.
//! It implements:
//!
//! - A push-based signal engine with glitch-free, single-threaded
//!   propagation passes
//! - A combinator library (map, filter, reduce, merge, latest, sample-on,
//!   start-with, flat-map)
//! - Dynamic subscriptions for collections of child components
//! - A component wiring resolver that links mutually referencing sinks
//! - The driver boundary: DOM event sources and view renderers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node topology, pass ordering and cycle analysis
//! - `reactive`: the runtime, signals, combinators and ownership scopes
//! - `component`: component declarations and the wiring resolver
//! - `driver`: DOM sources, view trees and renderers
//!
//! # Example
//!
//! ```rust
//! use tangle_core::component::{Component, Sources};
//! use tangle_core::driver::{self, RecordingRenderer, VNode, VirtualDom};
//! use tangle_core::reactive::Runtime;
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! let rt = Runtime::new();
//! let dom = Rc::new(VirtualDom::new(&rt));
//!
//! let counter = Component::<()>::new("counter")
//!     .sink("view", |_, _, _, sinks| {
//!         Ok(sinks
//!             .get::<u32>("count")?
//!             .map(|n| VNode::element("button").with_text(n.to_string())))
//!     })
//!     .sink("count", |_, _, sources, _| {
//!         let clicks = sources.dom()?.select("button", "click");
//!         Ok(clicks.reduce(0u32, |n, _| n + 1).start_with(0))
//!     });
//!
//! let sources = Sources::new().with_dom(dom.clone());
//! let app = driver::run(&rt, &counter, &(), &sources, RecordingRenderer::new()).unwrap();
//!
//! dom.dispatch("button", "click", json!({})).unwrap();
//! assert_eq!(app.renderer().last().unwrap().text_content(), "1");
//! ```

pub mod component;
pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod reactive;

pub use component::{Component, Instance, Sinks, Sources};
pub use config::RuntimeConfig;
pub use error::{BoxError, DriverError, ReactiveError, RenderError, WiringError};
pub use reactive::{Emitter, Runtime, Signal, Subscription};
