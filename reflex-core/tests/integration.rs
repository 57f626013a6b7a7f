//! Integration Tests for Reactive System
//!
//! These tests verify that wrappers, effects, computed values, and watchers
//! work together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reflex_core::graph::{DepKey, SourceId};
use reflex_core::reactive::Runtime;
use reflex_core::{
    batch, is_reactive, mark_raw, reactive, readonly, shallow_reactive, to_raw, untracked, watch,
    Computed, Effect, Instance, Key, Reactive, Target, Value, WatchOptions, WatchSource,
};
use serde_json::json;

fn state(value: serde_json::Value) -> Reactive {
    reactive(&Value::from(value)).into_proxy().unwrap()
}

/// Wrapping returns a new value, and wrapping again returns the same wrapper.
#[test]
fn wrapping_is_idempotent() {
    let raw = Value::from(json!({"a": 1}));
    let wrapped = reactive(&raw);

    assert!(!wrapped.same(&raw));
    assert!(reactive(&wrapped).same(&wrapped));
    assert!(reactive(&raw).same(&wrapped));
    assert!(is_reactive(&wrapped));
}

/// The raw target of a wrapper is the original object.
#[test]
fn to_raw_round_trips() {
    let raw = Value::from(json!({"a": {"b": 1}}));
    assert!(to_raw(&reactive(&raw)).same(&raw));
    assert!(to_raw(&readonly(&raw)).same(&raw));
    assert!(to_raw(&shallow_reactive(&raw)).same(&raw));

    // nested wrappers point at the nested raw object
    let nested_raw = raw.as_target().unwrap().get(&Key::from("a")).unwrap();
    let nested = reactive(&raw).into_proxy().unwrap().get("a");
    assert!(to_raw(&nested).same(&nested_raw));
}

/// Reading the same property twice in one run registers one dependency.
#[test]
fn repeat_reads_register_once() {
    let state = state(json!({"x": 1}));
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("x");
        reader.get("x");
    });

    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(
        Runtime::subscriber_count(state.id(), &DepKey::Key(Key::from("x"))),
        1
    );
    effect.dispose();
}

/// An effect reading two properties reruns once when both change in a batch.
#[test]
fn batched_writes_rerun_once() {
    let state = state(json!({"a": 1, "b": 2}));
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("a");
        reader.get("b");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    batch(|| {
        state.set("a", 10).unwrap();
        state.set("b", 20).unwrap();
    });
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.assign([("a", 100), ("b", 200)]).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    effect.dispose();
}

/// Writing the current value back never triggers; a different value does.
#[test]
fn no_op_writes_do_not_trigger() {
    let state = state(json!({"x": 1, "s": "text", "f": 0.5}));
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("x");
        reader.get("s");
        reader.get("f");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let x = state.get("x");
    state.set("x", x).unwrap();
    state.set("s", "text").unwrap();
    state.set("f", 0.5).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("x", 2).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

/// After dispose, no former dependency reruns the effect.
#[test]
fn disposed_effects_never_rerun() {
    let state = state(json!({"a": 1, "list": [1]}));
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("a");
        reader.get_proxy("list").unwrap().len();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    effect.dispose();
    state.set("a", 2).unwrap();
    state.get_proxy("list").unwrap().push(2).unwrap();
    state.delete("a").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Map reads track the entry key, and writes to a key rerun exactly its
/// readers.
#[test]
fn map_entries_are_tracked_by_key() {
    let map = reactive(&Value::Object(Target::map_from([("k", 1), ("j", 1)])))
        .into_proxy()
        .unwrap();

    let k_runs = Arc::new(AtomicI32::new(0));
    let k_runs_clone = k_runs.clone();
    let k_reader = map.clone();
    let k_effect = Effect::new(move || {
        k_reader.get("k");
        k_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let j_runs = Arc::new(AtomicI32::new(0));
    let j_runs_clone = j_runs.clone();
    let j_reader = map.clone();
    let j_effect = Effect::new(move || {
        j_reader.get("j");
        j_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    // nothing is keyed on the method name
    assert_eq!(
        Runtime::subscriber_count(map.id(), &DepKey::Key(Key::from("get"))),
        0
    );

    map.set("k", 2).unwrap();
    assert_eq!(k_runs.load(Ordering::SeqCst), 2);
    assert_eq!(j_runs.load(Ordering::SeqCst), 1);

    map.delete("j").unwrap();
    assert_eq!(k_runs.load(Ordering::SeqCst), 2);
    assert_eq!(j_runs.load(Ordering::SeqCst), 2);

    k_effect.dispose();
    j_effect.dispose();
}

/// Scenario: an effect mirrors a derived value of the state.
#[test]
fn effect_mirrors_state() {
    let state = state(json!({"count": 0}));
    let seen = Arc::new(AtomicI32::new(-1));
    let seen_clone = seen.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        let count = reader.get("count").as_int().unwrap_or(0) as i32;
        seen_clone.store(count * 2, Ordering::SeqCst);
    });

    state.set("count", 5).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    effect.dispose();
}

/// Scenario: nested objects are wrapped lazily and still tracked.
#[test]
fn nested_reads_are_tracked() {
    let state = state(json!({"a": {"b": 1}}));
    let seen = Arc::new(AtomicI32::new(-1));
    let seen_clone = seen.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        let b = reader.get_proxy("a").unwrap().get("b");
        seen_clone.store(b.as_int().unwrap_or(0) as i32, Ordering::SeqCst);
    });

    state.get_proxy("a").unwrap().set("b", 2).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    // replacing the nested object reruns too
    state.set("a", Value::from(json!({"b": 3}))).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    effect.dispose();
}

/// Scenario: frozen input comes back unwrapped.
#[test]
fn frozen_targets_are_not_wrapped() {
    let target = Target::object_from([("x", 1)]);
    target.freeze();
    let raw = Value::Object(target);

    let result = reactive(&raw);
    assert!(result.same(&raw));
    assert!(!is_reactive(&result));

    let skipped = mark_raw(&Value::from(json!({"x": 1})));
    assert!(reactive(&skipped).same(&skipped));
}

/// Scenario: a computed recomputes once per change, and only when read.
#[test]
fn computed_recomputes_lazily() {
    let state = state(json!({"count": 1}));
    let computes = Arc::new(AtomicI32::new(0));
    let computes_clone = computes.clone();
    let reader = state.clone();
    let doubled = Computed::new(move || {
        computes_clone.fetch_add(1, Ordering::SeqCst);
        reader.get("count").as_int().unwrap_or(0) * 2
    });

    assert_eq!(doubled.get(), 2);
    assert_eq!(doubled.get(), 2);
    assert_eq!(computes.load(Ordering::SeqCst), 1);

    state.set("count", 2).unwrap();
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert!(doubled.is_dirty());

    assert_eq!(doubled.get(), 4);
    assert_eq!(doubled.get(), 4);
    assert_eq!(computes.load(Ordering::SeqCst), 2);
}

/// Readonly wrappers track reads but drop writes.
#[test]
fn readonly_wrappers_drop_writes() {
    let raw = Value::from(json!({"x": 1, "nested": {"y": 1}}));
    let view = readonly(&raw).into_proxy().unwrap();
    let mutable = reactive(&raw).into_proxy().unwrap();

    let seen = Arc::new(AtomicI32::new(0));
    let seen_clone = seen.clone();
    let reader = view.clone();
    let effect = Effect::new(move || {
        seen_clone.store(reader.get("x").as_int().unwrap_or(0) as i32, Ordering::SeqCst);
    });

    assert_eq!(view.set("x", 5), Ok(false));
    assert_eq!(view.get_proxy("nested").unwrap().set("y", 5), Ok(false));
    assert_eq!(raw.as_target().unwrap().get(&Key::from("x")), Some(Value::Int(1)));

    // writes through a mutable wrapper reach readonly readers
    mutable.set("x", 7).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 7);
    effect.dispose();
}

/// Shallow wrappers only observe top-level keys.
#[test]
fn shallow_wrappers_leave_nested_objects_raw() {
    let raw = Value::from(json!({"nested": {"y": 1}}));
    let shallow = shallow_reactive(&raw).into_proxy().unwrap();

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = shallow.clone();
    let effect = Effect::new(move || {
        let nested = reader.get("nested");
        nested.as_target().unwrap().get(&Key::from("y"));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    shallow
        .get("nested")
        .as_target()
        .unwrap()
        .insert("y", 2)
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    shallow.set("nested", Value::from(json!({"y": 3}))).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

/// An effect that writes what it reads does not rerun itself.
#[test]
fn self_writes_do_not_recurse() {
    let state = state(json!({"count": 0}));
    let reader = state.clone();
    let effect = Effect::new(move || {
        let count = reader.get("count").as_int().unwrap_or(0);
        reader.set("count", count + 1).unwrap();
    });

    assert_eq!(effect.run_count(), 1);
    assert_eq!(state.get("count"), Value::Int(1));

    // an outside write still reruns it
    state.set("count", 10).unwrap();
    assert_eq!(effect.run_count(), 2);
    assert_eq!(state.get("count"), Value::Int(11));
    effect.dispose();
}

/// An effect disposed by another effect during the same notification does
/// not run.
#[test]
fn disposal_during_notification() {
    let state = state(json!({"x": 0}));
    let second_runs = Arc::new(AtomicI32::new(0));

    let second_runs_clone = second_runs.clone();
    let second_reader = state.clone();
    let second = Effect::new_lazy(move || {
        second_reader.get("x");
        second_runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    let first_reader = state.clone();
    let victim = second.clone();
    let first = Effect::new(move || {
        if first_reader.get("x").as_int() == Some(1) {
            victim.dispose();
        }
    });
    second.run();
    assert_eq!(second_runs.load(Ordering::SeqCst), 1);

    state.set("x", 1).unwrap();
    assert_eq!(second_runs.load(Ordering::SeqCst), 1);
    assert!(second.is_disposed());
    first.dispose();
}

/// Structural reads follow adds and deletes.
#[test]
fn iteration_tracks_structure() {
    let list = state(json!([1, 2, 3]));
    let sum = Arc::new(AtomicI32::new(0));
    let sum_clone = sum.clone();
    let reader = list.clone();
    let effect = Effect::new(move || {
        let total: i64 = reader.values().iter().filter_map(Value::as_int).sum();
        sum_clone.store(total as i32, Ordering::SeqCst);
    });
    assert_eq!(sum.load(Ordering::SeqCst), 6);

    list.push(4).unwrap();
    assert_eq!(sum.load(Ordering::SeqCst), 10);

    list.pop().unwrap();
    assert_eq!(sum.load(Ordering::SeqCst), 6);

    list.set(0usize, 10).unwrap();
    assert_eq!(sum.load(Ordering::SeqCst), 15);
    effect.dispose();
}

/// Untracked reads inside an effect create no dependency.
#[test]
fn untracked_reads_are_ignored() {
    let state = state(json!({"tracked": 0, "ignored": 0}));
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let reader = state.clone();
    let effect = Effect::new(move || {
        reader.get("tracked");
        untracked(|| reader.get("ignored"));
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    state.set("ignored", 1).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    state.set("tracked", 1).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    effect.dispose();
}

/// A watcher sees deep changes on a wrapper and stops on unwatch.
#[test]
fn watcher_lifecycle() {
    let state = state(json!({"todos": [{"done": false}]}));
    let calls = Arc::new(Mutex::new(0));
    let calls_clone = calls.clone();
    let handle = watch(
        state.clone(),
        move |_, _| *calls_clone.lock() += 1,
        WatchOptions::default(),
    );

    let todo = state.get_proxy("todos").unwrap().get_proxy(0usize).unwrap();
    todo.set("done", true).unwrap();
    assert_eq!(*calls.lock(), 1);

    handle.unwatch();
    todo.set("done", false).unwrap();
    assert_eq!(*calls.lock(), 1);

    let reader = state.clone();
    let immediate = watch(
        WatchSource::getter(move || reader.get_proxy("todos").unwrap().len().into()),
        {
            let calls = calls.clone();
            move |new, old| {
                assert_eq!(*new, Value::Int(1));
                assert!(old.is_undefined());
                *calls.lock() += 1;
            }
        },
        WatchOptions::default().immediate(true),
    );
    assert_eq!(*calls.lock(), 2);
    immediate.unwatch();
}

/// Dropping every handle to a target removes its dependency entries.
#[test]
fn dropped_targets_leave_no_entries() {
    let slot = Arc::new(Mutex::new(Some(state(json!({"x": 1})))));
    let source: SourceId = slot.lock().as_ref().unwrap().id();

    let reader = slot.clone();
    let effect = Effect::new(move || {
        if let Some(state) = reader.lock().as_ref() {
            state.get("x");
        }
    });
    assert_eq!(Runtime::subscriber_count(source, &DepKey::Key(Key::from("x"))), 1);

    let last_handle = slot.lock().take();
    drop(last_handle);
    assert_eq!(Runtime::subscriber_count(source, &DepKey::Key(Key::from("x"))), 0);
    effect.dispose();
}

/// The instance bridge forwards properties and re-renders on change.
#[test]
fn instance_renders_on_change() {
    let vm = Instance::new(Value::from(json!({"name": "world", "$skip": true}))).unwrap();
    vm.define_computed("greeting", |data| {
        Value::from(format!("Hello, {}!", data.get("name")))
    })
    .unwrap();

    let output = Arc::new(Mutex::new(String::new()));
    let sink = output.clone();
    let effect = vm.mount("<h1>{{ greeting }}</h1>{{ $skip }}", move |html| {
        *sink.lock() = html.to_string()
    });
    assert_eq!(*output.lock(), "<h1>Hello, world!</h1>");

    vm.set("name", "reflex").unwrap();
    assert_eq!(*output.lock(), "<h1>Hello, reflex!</h1>");
    effect.dispose();
}

/// A panicking effect aborts the rest of its flush without leaving queued
/// work behind for unrelated writes.
#[test]
fn panicking_effect_does_not_leak_queued_reruns() {
    let state = state(json!({"x": 0, "y": 0}));

    let reader = state.clone();
    let failing = Effect::new(move || {
        if reader.get("x") == Value::Int(1) {
            panic!("x rejected");
        }
    });

    let x_runs = Arc::new(AtomicI32::new(0));
    let counter = x_runs.clone();
    let reader = state.clone();
    let x_reader = Effect::new(move || {
        reader.get("x");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let y_runs = Arc::new(AtomicI32::new(0));
    let counter = y_runs.clone();
    let reader = state.clone();
    let y_reader = Effect::new(move || {
        reader.get("y");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let writer = state.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| writer.set("x", 1)));
    assert!(result.is_err());
    assert_eq!(x_runs.load(Ordering::SeqCst), 1);

    state.set("y", 1).unwrap();
    assert_eq!(y_runs.load(Ordering::SeqCst), 2);
    assert_eq!(x_runs.load(Ordering::SeqCst), 1, "discarded rerun must not resurface");

    state.set("x", 2).unwrap();
    assert_eq!(x_runs.load(Ordering::SeqCst), 2);

    for effect in [failing, x_reader, y_reader] {
        effect.dispose();
    }
}
