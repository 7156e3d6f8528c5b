//! Integration Tests for Component Wiring
//!
//! These tests verify forward and mutual sink references, value cycle
//! detection and aggregate disposal.

use std::cell::RefCell;
use std::rc::Rc;

use tangle_core::component::{Component, Sources};
use tangle_core::reactive::{Runtime, Signal, Subscription};
use tangle_core::{RuntimeConfig, WiringError};

fn record<T: Clone + 'static>(signal: &Signal<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let sub = signal
        .observe(move |v: &T| sink.borrow_mut().push(v.clone()))
        .unwrap();
    (seen, sub)
}

/// A component whose sinks feed each other through a filter.
fn ping_pong() -> Component<()> {
    Component::new("ping_pong")
        .sink("ping", |rt, _, sources, sinks| {
            let serve = sources.signal::<u32>("serve")?;
            let returned = sinks.get::<u32>("pong")?.map(|v| v + 1);
            Ok(rt.merge(&[serve, returned]))
        })
        .sink("pong", |_, _, _, sinks| {
            Ok(sinks.get::<u32>("ping")?.filter(|v| *v < 5).map(|v| v + 1))
        })
}

/// Test that sinks defined in terms of each other both emit.
#[test]
fn mutual_references_emit() {
    let rt = Runtime::new();
    let serve = rt.emitter::<u32>();
    let sources = Sources::new().with_signal("serve", serve.signal());

    let instance = ping_pong().invoke(&rt, &(), &sources).unwrap();
    let (ping, _a) = record(&instance.sink::<u32>("ping").unwrap());
    let (pong, _b) = record(&instance.sink::<u32>("pong").unwrap());

    serve.emit(0).unwrap();
    assert_eq!(*ping.borrow(), vec![0, 2, 4, 6]);
    assert_eq!(*pong.borrow(), vec![1, 3, 5]);
}

/// Test that a sink may read itself through its own placeholder.
#[test]
fn self_reference_with_seed() {
    let rt = Runtime::new();
    let step = rt.emitter::<i32>();
    let sources = Sources::new().with_signal("step", step.signal());

    let running = Component::<i32>::new("running").sink("total", |_, start, sources, sinks| {
        let total = sinks.get::<i32>("total")?;
        let step = sources.signal::<i32>("step")?;
        Ok(total
            .sample_on(&step)
            .latest(&step)
            .map(|(total, step)| total + step)
            .start_with(*start))
    });

    let instance = running.invoke(&rt, &100, &sources).unwrap();
    let (totals, _sub) = record(&instance.sink::<i32>("total").unwrap());

    step.emit(1).unwrap();
    step.emit(10).unwrap();
    assert_eq!(*totals.borrow(), vec![100, 101, 111]);
}

/// Test that a pure reference loop is rejected with the keys involved.
#[test]
fn value_cycle_names_offending_keys() {
    let rt = Runtime::new();
    let input = rt.emitter::<i32>();
    let sources = Sources::new().with_signal("input", input.signal());

    let tangled = Component::<()>::new("tangled")
        .sink("view", |_, _, sources, _| {
            Ok(sources.signal::<i32>("input")?.map(|v| v.to_string()))
        })
        .sink("left", |_, _, _, sinks| Ok(sinks.get::<i32>("right")?.map(|v| v - 1)))
        .sink("right", |_, _, _, sinks| Ok(sinks.get::<i32>("left")?.map(|v| v + 1)));

    let err = tangled.invoke(&rt, &(), &sources).unwrap_err();
    match &err {
        WiringError::ValueCycle { component, keys } => {
            assert_eq!(component, "tangled");
            assert_eq!(keys, &["left".to_string(), "right".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("left, right"));

    // Nothing of the failed instance is left behind.
    assert_eq!(rt.node_count(), 1);
}

/// Test that a loop fed from outside is not a value cycle.
#[test]
fn loop_with_external_input_is_live() {
    let rt = Runtime::with_config(RuntimeConfig {
        detect_value_cycles: true,
        ..RuntimeConfig::default()
    });
    let serve = rt.emitter::<u32>();
    let sources = Sources::new().with_signal("serve", serve.signal());
    assert!(ping_pong().invoke(&rt, &(), &sources).is_ok());
}

/// Test that a reference to an undeclared sink fails construction.
#[test]
fn unknown_sink_is_reported() {
    let rt = Runtime::new();
    let broken = Component::<()>::new("broken")
        .sink("view", |_, _, _, sinks| sinks.get::<String>("header"));

    match broken.invoke(&rt, &(), &Sources::new()) {
        Err(WiringError::MissingSink { component, key }) => {
            assert_eq!(component, "broken");
            assert_eq!(key, "header");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

/// Test that a definition error is passed through unchanged.
#[test]
fn definition_errors_propagate() {
    let rt = Runtime::new();
    let failing = Component::<()>::new("failing").sink(
        "view",
        |_, _, _, _| -> Result<Signal<i32>, WiringError> {
            Err(WiringError::Definition {
                key: "view".into(),
                source: "no backend".into(),
            })
        },
    );

    let err = failing.invoke(&rt, &(), &Sources::new()).unwrap_err();
    assert!(matches!(err, WiringError::Definition { .. }));
}

/// Test that disposing a parent also disposes children it invoked.
#[test]
fn dispose_reaches_nested_children() {
    let rt = Runtime::new();
    let input = rt.emitter::<i32>();
    let sources = Sources::new().with_signal("input", input.signal());

    let child = Component::<i32>::new("child").sink("view", |_, offset, sources, _| {
        let offset = *offset;
        Ok(sources.signal::<i32>("input")?.map(move |v| v + offset))
    });
    let parent = Component::<()>::new("parent").sink("view", move |rt, _, sources, _| {
        let left = child.invoke(rt, &1, sources)?.view::<i32>()?;
        let right = child.invoke(rt, &2, sources)?.view::<i32>()?;
        Ok(tangle_core::reactive::latest(&left, &right).map(|(l, r)| l * r))
    });

    let instance = parent.invoke(&rt, &(), &sources).unwrap();
    let view = instance.view::<i32>().unwrap();
    input.emit(3).unwrap();
    assert_eq!(view.current(), Some(20));

    instance.dispose();
    assert_eq!(instance.live_count(), 0);
    assert_eq!(rt.node_count(), 1);
}
