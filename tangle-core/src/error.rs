//! Error types for the signal engine, the wiring resolver and the driver
//! boundary.

use thiserror::Error;

/// Failure payload returned by fallible user functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while a propagation pass runs.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A user-supplied function failed. The pass was aborted.
    #[error("combinator {node} failed: {source}")]
    Combinator {
        node: String,
        #[source]
        source: BoxError,
    },

    /// The nodes reachable from a pass root contain a cycle.
    #[error("propagation cycle through {}", labels.join(" -> "))]
    Cycle { labels: Vec<String> },

    /// One external trigger kept queueing follow-up passes.
    #[error("propagation did not settle after {limit} passes")]
    PassLimit { limit: usize },
}

/// Errors raised while a component is being wired.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("component `{component}` has no sink `{key}`")]
    MissingSink { component: String, key: String },

    #[error("sink `{key}` of component `{component}` is not a signal of {expected}")]
    SinkType {
        component: String,
        key: String,
        expected: &'static str,
    },

    #[error("component `{component}` declares sink `{key}` more than once")]
    DuplicateSink { component: String, key: String },

    #[error("no source `{key}` was supplied")]
    MissingSource { key: String },

    #[error("source `{key}` is not a signal of {expected}")]
    SourceType { key: String, expected: &'static str },

    #[error("no DOM source was supplied")]
    MissingDomSource,

    /// A group of sinks can only be triggered by each other.
    #[error("sinks {} of component `{component}` depend on each other's values and can never emit", keys.join(", "))]
    ValueCycle { component: String, keys: Vec<String> },

    /// A definition function reported a failure of its own.
    #[error("definition of sink `{key}` failed: {source}")]
    Definition {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The initial values of the new component could not be delivered.
    #[error(transparent)]
    Propagation(#[from] ReactiveError),
}

/// Errors raised by renderers.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode view tree: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while starting an application.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error("component `{component}` declares no sinks")]
    MissingView { component: String },
}
