//! Integration Tests for Reactive System
//!
//! These tests verify that observables, computeds and autoruns work together
//! through a shared engine.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Once};

use weft_core::graph::NodeKind;
use weft_core::reactive::{Computed, ComputedState, Engine, Observable, Subscriber};
use weft_core::{EngineConfig, Error};

static TRACING: Once = Once::new();

/// Route engine logs to the test output when `RUST_LOG` is set.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test the basic chain: observable -> computed, without manual resubscription.
#[test]
fn computed_follows_observable_without_resubscribing() {
    init_tracing();
    let engine = Engine::new();
    let count = Observable::new(&engine, "count", 0);

    let count_clone = count.clone();
    let doubled = Computed::new(&engine, "doubled", move |_| count_clone.read() * 2);

    assert_eq!(doubled.read(), Ok(0));
    count.write(5);
    assert_eq!(doubled.read(), Ok(10));

    // An autorun reading count, once disposed, never runs again.
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let count_clone = count.clone();
    let disposer = engine
        .autorun(move || {
            count_clone.read();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    disposer.dispose();
    count.write(6);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(doubled.read(), Ok(12));
}

/// Test that repeated reads in one cycle create a single dependency edge.
#[test]
fn repeated_reads_register_one_edge() {
    init_tracing();
    let engine = Engine::new();
    let a = Observable::new(&engine, "a", 2);

    let a_clone = a.clone();
    let squared = Computed::new(&engine, "squared", move |_| a_clone.read() * a_clone.read());

    assert_eq!(squared.read(), Ok(4));
    assert_eq!(squared.dependency_count(), 1);
    assert_eq!(a.subscriber_count(), 1);
}

/// Test that a conditional branch subscribes, unsubscribes and resubscribes
/// without leaving stale entries behind.
#[test]
fn conditional_branch_toggles_subscription() {
    init_tracing();
    let engine = Engine::new();
    let a = Observable::new(&engine, "a", 10);
    let b = Observable::new(&engine, "b", false);

    let (a_clone, b_clone) = (a.clone(), b.clone());
    let c = Computed::new(&engine, "c", move |_| {
        if b_clone.read() {
            a_clone.read()
        } else {
            -1
        }
    });
    let token = c.reevaluation_id();

    assert_eq!(c.read(), Ok(-1));
    assert_eq!(a.subscriber_count(), 0);

    for round in 0..3 {
        b.write(true);
        assert_eq!(c.read(), Ok(10 + round));
        assert!(a.has_subscriber(token));
        assert_eq!(a.subscriber_count(), 1);

        b.write(false);
        assert_eq!(c.read(), Ok(-1));
        assert!(!a.has_subscriber(token));
        assert_eq!(a.subscriber_count(), 0);

        a.write(11 + round);
    }
    assert_eq!(b.subscriber_count(), 1);
}

/// Test that autoruns run exactly once at creation, even when reading nothing.
#[test]
fn autorun_runs_once_at_creation() {
    init_tracing();
    let engine = Engine::new();
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();

    let disposer = engine
        .autorun(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(disposer.tracked().is_empty());
}

/// Test that an autorun sees a computed update through the whole chain.
#[test]
fn autorun_reacts_through_computed_chain() {
    init_tracing();
    let engine = Engine::new();
    let price = Observable::new(&engine, "price", 10);
    let quantity = Observable::new(&engine, "quantity", 2);

    let (price_clone, quantity_clone) = (price.clone(), quantity.clone());
    let total = Computed::new(&engine, "total", move |_| price_clone.read() * quantity_clone.read());

    let observed = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed.clone();
    let total_clone = total.clone();
    let disposer = engine
        .autorun(move || {
            if let Ok(value) = total_clone.read() {
                observed_clone.store(value, Ordering::SeqCst);
            }
        })
        .unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 20);
    assert_eq!(disposer.tracked(), vec![total.id()]);

    quantity.write(3);
    assert_eq!(observed.load(Ordering::SeqCst), 30);
    price.write(5);
    assert_eq!(observed.load(Ordering::SeqCst), 15);

    disposer.dispose();
    assert_eq!(total.subscriber_count(), 0);
}

/// Test that the gate suppresses notification and re-evaluation, but not reads.
#[test]
fn gate_suppresses_reactions_but_not_reads() {
    init_tracing();
    let engine = Engine::new();
    let count = Observable::new(&engine, "count", 1);

    let count_clone = count.clone();
    let doubled = Computed::new(&engine, "doubled", move |_| count_clone.read() * 2);
    assert_eq!(doubled.read(), Ok(2));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let count_clone = count.clone();
    let _disposer = engine
        .autorun(move || {
            count_clone.read();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let resume = engine.disable_reactions();
    assert!(!engine.reactions_enabled());

    count.write(4);
    assert_eq!(count.read(), 4);
    assert_eq!(doubled.read(), Ok(2));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A second disable while closed cannot reopen the gate.
    let inner = engine.disable_reactions();
    assert!(inner.is_noop());
    inner.resume();
    assert!(!engine.reactions_enabled());

    resume.resume();
    assert!(engine.reactions_enabled());

    count.write(5);
    assert_eq!(doubled.read(), Ok(10));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that an engine can start with reactions disabled.
#[test]
fn engine_config_from_json() {
    init_tracing();
    let config = EngineConfig::from_json(r#"{"name": "bulk", "reactions_enabled": false}"#).unwrap();
    let engine = Engine::with_config(config);
    assert_eq!(engine.name(), "bulk");

    let count = Observable::new(&engine, "count", 0);
    let subscriber_runs = Arc::new(AtomicI32::new(0));
    let subscriber_runs_clone = subscriber_runs.clone();
    count.subscribe(&Subscriber::new(move || {
        subscriber_runs_clone.fetch_add(1, Ordering::SeqCst);
    }));

    count.write(1);
    assert_eq!(subscriber_runs.load(Ordering::SeqCst), 0);
}

/// Test that subscribing then fully unsubscribing leaves no trace.
#[test]
fn subscribe_unsubscribe_round_trip() {
    init_tracing();
    let engine = Engine::new();
    let a = Observable::new(&engine, "a", 0);
    let subscriber = Subscriber::new(|| {});

    a.subscribe(&subscriber);
    a.subscribe(&subscriber);
    assert_eq!(a.subscriber_count(), 1);

    a.unsubscribe(subscriber.id());
    assert_eq!(a.subscriber_count(), 0);
    assert!(!a.has_subscriber(subscriber.id()));

    // Same for a computed's automatic subscription.
    let a_clone = a.clone();
    let c = Computed::new(&engine, "c", move |_| a_clone.read());
    assert_eq!(c.read(), Ok(0));
    assert_eq!(a.subscriber_count(), 1);
    c.dispose();
    assert_eq!(a.subscriber_count(), 0);
}

/// Test that independent engines do not see each other's tracking.
#[test]
fn engines_are_isolated() {
    init_tracing();
    let left = Engine::with_config(EngineConfig::default().with_name("left"));
    let right = Engine::with_config(EngineConfig::default().with_name("right"));
    let a = Observable::new(&left, "a", 1);
    let b = Observable::new(&right, "b", 2);

    let _resume = right.disable_reactions();
    assert!(left.reactions_enabled());

    let disposer = left
        .autorun({
            let a = a.clone();
            let b = b.clone();
            move || {
                a.read();
                b.read();
            }
        })
        .unwrap();

    // b reports to its own engine, which has no active context.
    assert_eq!(disposer.tracked(), vec![a.id()]);
    assert_eq!(left.nodes().len(), 1);
    assert_eq!(right.nodes().len(), 1);
}

/// Test that the registry describes live nodes.
#[test]
fn registry_lists_live_nodes() {
    init_tracing();
    let engine = Engine::new();
    let a = Observable::new(&engine, "a", 1);
    let a_clone = a.clone();
    let c = Computed::new(&engine, "c", move |_| a_clone.read());
    assert_eq!(c.read(), Ok(1));

    let nodes = engine.nodes();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].name, "a");
    assert_eq!(nodes[0].kind, NodeKind::Observable);
    assert_eq!(nodes[0].subscribers, 1);
    assert_eq!(nodes[1].name, "c");
    assert_eq!(nodes[1].kind, NodeKind::Computed);

    drop(c);
    assert_eq!(engine.nodes().len(), 1);
    assert_eq!(a.subscriber_count(), 0);
}

/// Test that a watch window refreshes an autorun's dependency set.
#[test]
fn watch_window_refreshes_dependencies() {
    init_tracing();
    let engine = Engine::new();
    let mode = Observable::new(&engine, "mode", "list".to_string());
    let items = Observable::new(&engine, "items", 3);
    let detail = Observable::new(&engine, "detail", 7);

    let renders = Arc::new(AtomicI32::new(0));
    let render = {
        let (mode, items, detail) = (mode.clone(), items.clone(), detail.clone());
        let renders = renders.clone();
        move || {
            renders.fetch_add(1, Ordering::SeqCst);
            if mode.read() == "list" {
                items.read();
            } else {
                detail.read();
            }
        }
    };

    let disposer = engine.autorun(render.clone()).unwrap();
    assert_eq!(disposer.tracked(), vec![mode.id(), items.id()]);

    // The host switches mode and re-renders inside a watch window.
    mode.write("detail".to_string());
    engine.start_watch(&disposer).unwrap();
    render();
    let reads = engine.stop_watch(&disposer).unwrap();
    engine.extend_subscription(&disposer, reads);

    assert_eq!(items.subscriber_count(), 0);
    assert_eq!(detail.subscriber_count(), 1);

    let before = renders.load(Ordering::SeqCst);
    items.write(4);
    assert_eq!(renders.load(Ordering::SeqCst), before);
    detail.write(8);
    assert_eq!(renders.load(Ordering::SeqCst), before + 1);

    disposer.dispose();
}

/// Test that a computed reading itself is reported as a cycle.
#[test]
fn mutual_recursion_is_a_cycle() {
    init_tracing();
    let engine = Engine::new();
    let slot: Arc<std::sync::OnceLock<Computed<i32>>> = Arc::new(std::sync::OnceLock::new());

    let first = {
        let slot = slot.clone();
        Computed::try_new(&engine, "first", move |_| match slot.get() {
            Some(second) => Ok(second.read()? + 1),
            None => Ok(0),
        })
    };
    let second = {
        let first = first.clone();
        Computed::try_new(&engine, "second", move |_| Ok(first.read()? + 1))
    };
    let _ = slot.set(second.clone());

    let result = first.read();
    assert!(matches!(result, Err(Error::CycleDetected(_))));
    assert!(!engine.is_tracking());
    assert!(first.dependencies().is_empty());
}

/// Test async computeds resolve and feed autoruns.
#[tokio::test]
async fn async_computed_feeds_autorun() {
    init_tracing();
    let engine = Engine::new();
    let user_id = Observable::new(&engine, "user_id", 1);

    let user_id_clone = user_id.clone();
    let profile = Computed::new_async(&engine, "profile", move |_| {
        let id = user_id_clone.read();
        async move {
            tokio::task::yield_now().await;
            Ok::<_, Error>(format!("user-{id}"))
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let profile_clone = profile.clone();
    let disposer = engine
        .autorun(move || {
            if let Ok(name) = profile_clone.read() {
                let _ = tx.send(name);
            }
        })
        .unwrap();

    assert!(matches!(profile.state(), ComputedState::Pending { .. }));
    assert_eq!(rx.recv().await.as_deref(), Some("user-1"));

    user_id.write(2);
    assert_eq!(rx.recv().await.as_deref(), Some("user-2"));
    assert_eq!(profile.state(), ComputedState::Resolved);

    disposer.dispose();
}
