//! Integration Tests for the Propagation Engine
//!
//! These tests verify pass ordering, re-entrancy and error behaviour of the
//! runtime as seen through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use tangle_core::reactive::{latest, Runtime, Signal, Subscription};
use tangle_core::{ReactiveError, RuntimeConfig};

fn record<T: Clone + 'static>(signal: &Signal<T>) -> (Rc<RefCell<Vec<T>>>, Subscription) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let sub = signal
        .observe(move |v: &T| sink.borrow_mut().push(v.clone()))
        .unwrap();
    (seen, sub)
}

/// Test that a node reached through two paths only sees settled values.
#[test]
fn diamond_is_glitch_free() {
    let rt = Runtime::new();
    let root = rt.emitter::<i32>();

    let plus = root.signal().map(|v| v + 1);
    let times = root.signal().map(|v| v * 2);
    let both = latest(&plus, &times);
    let (seen, _sub) = record(&both);

    root.emit(1).unwrap();
    root.emit(5).unwrap();

    // One tuple per emission, never a mix of old and new.
    assert_eq!(*seen.borrow(), vec![(2, 2), (6, 10)]);
}

/// Test that a long chain is visited once per emission.
#[test]
fn deep_chain_runs_each_node_once() {
    let rt = Runtime::new();
    let root = rt.emitter::<u64>();
    let calls = Rc::new(RefCell::new(0));

    let mut tip = root.signal();
    for _ in 0..50 {
        let calls = calls.clone();
        tip = tip.map(move |v| {
            *calls.borrow_mut() += 1;
            v + 1
        });
    }
    let (seen, _sub) = record(&tip);

    root.emit(0).unwrap();
    assert_eq!(*seen.borrow(), vec![50]);
    assert_eq!(*calls.borrow(), 50);
    assert_eq!(rt.pass_count(), 1);
}

/// Test that nodes with no upstream emission are not recomputed.
#[test]
fn untouched_branches_stay_idle() {
    let rt = Runtime::new();
    let left = rt.emitter::<i32>();
    let right = rt.emitter::<i32>();
    let calls = Rc::new(RefCell::new(0));

    let counter = calls.clone();
    let _right_branch = right.signal().map(move |v| {
        *counter.borrow_mut() += 1;
        *v
    });

    left.emit(1).unwrap();
    left.emit(2).unwrap();
    assert_eq!(*calls.borrow(), 0);
}

/// Test that emitting from an observer starts a follow-up pass.
#[test]
fn reentrant_emit_runs_after_current_pass() {
    let rt = Runtime::new();
    let first = rt.emitter::<i32>();
    let second = rt.emitter::<i32>();
    let log = Rc::new(RefCell::new(Vec::new()));

    let forward = second.clone();
    let entry = log.clone();
    let _relay = first
        .signal()
        .try_observe(move |v| {
            entry.borrow_mut().push(format!("relay {v}"));
            forward.emit(v * 10)?;
            entry.borrow_mut().push(format!("relayed {v}"));
            Ok(())
        })
        .unwrap();

    let entry = log.clone();
    let _after = second
        .signal()
        .observe(move |v| entry.borrow_mut().push(format!("second {v}")))
        .unwrap();

    first.emit(2).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["relay 2", "relayed 2", "second 20"]
    );
}

/// Test that a failing combinator aborts the pass and the graph recovers.
#[test]
fn failed_pass_keeps_visited_values() {
    let rt = Runtime::new();
    let root = rt.emitter::<i32>();
    let seen = root.signal().map(|v| *v);
    let checked = seen
        .try_map(|v| if *v == 13 { Err("unlucky") } else { Ok(*v) })
        .labelled("checked");
    let _keep = checked.observe(|_| {}).unwrap();

    let err = root.emit(13).unwrap_err();
    assert!(err.to_string().contains("checked"));
    assert_eq!(seen.current(), Some(13));
    assert_eq!(checked.current(), None);

    root.emit(14).unwrap();
    assert_eq!(checked.current(), Some(14));
}

/// Test that a rebind which closes a loop is reported as a cycle.
#[test]
fn rebinding_into_a_loop_is_a_cycle() {
    let rt = Runtime::new();
    let outer = rt.emitter::<()>();
    let slot: Rc<RefCell<Option<Signal<usize>>>> = Rc::new(RefCell::new(None));

    let inner = slot.clone();
    let follow = outer
        .signal()
        .flat_map(move |_| inner.borrow().iter().cloned().collect())
        .labelled("follow");
    let seed = rt.emitter::<usize>();
    let lengths = rt
        .merge(&[follow.map(|values| values.len()), seed.signal()])
        .labelled("lengths");
    seed.emit(5).unwrap();
    *slot.borrow_mut() = Some(lengths);

    match outer.emit(()) {
        Err(ReactiveError::Cycle { labels }) => {
            assert!(labels.contains(&"follow".to_string()));
            assert!(labels.contains(&"lengths".to_string()));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(!rt.is_propagating());

    // Break the loop so the graph can be released.
    follow.dispose();
}

/// Test that the pass limit comes from the configuration.
#[test]
fn pass_limit_is_configurable() {
    let rt = Runtime::with_config(RuntimeConfig::from_json(r#"{ "max_passes": 3 }"#).unwrap());
    let ticks = rt.emitter::<u32>();

    let again = ticks.clone();
    let _loop = ticks
        .signal()
        .try_observe(move |v| {
            again.emit(v + 1)?;
            Ok(())
        })
        .unwrap();

    assert!(matches!(
        ticks.emit(0),
        Err(ReactiveError::PassLimit { limit: 3 })
    ));
    assert_eq!(ticks.signal().current(), Some(2));
}

/// Test that runtimes never see each other's nodes.
#[test]
fn runtimes_are_isolated() {
    let a = Runtime::new();
    let b = Runtime::new();
    let x = a.emitter::<i32>();
    let y = b.emitter::<i32>();
    let _mx = x.signal().map(|v| v + 1);

    y.emit(1).unwrap();
    assert_eq!(a.pass_count(), 0);
    assert_eq!(a.node_count(), 2);
    assert_eq!(b.node_count(), 1);
}
