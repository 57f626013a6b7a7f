//! Watchers
//!
//! A watcher is an effect that computes a value and calls back with the new
//! and the previous value whenever the value changes.
//!
//! The watched value is produced by a getter, a wrapper (watched deeply), or
//! a computed. The callback runs through the update scheduler, so several
//! changes inside one batch call back once.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::graph::{SourceId, UpdateScheduler};
use crate::value::Value;

use super::computed::Computed;
use super::context::untracked;
use super::effect::{Effect, EffectOptions};
use super::proxy::Reactive;

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call back once on creation, with `Undefined` as the old value.
    pub immediate: bool,

    /// Track every nested key of the watched value, and call back on every
    /// change even when the value itself is the same object.
    pub deep: bool,
}

impl WatchOptions {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }
}

type Getter = Arc<dyn Fn() -> Value + Send + Sync>;
type Callback = Box<dyn Fn(&Value, &Value) + Send + Sync>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    Getter(Getter),

    /// A wrapper. Always watched deeply.
    Reactive(Reactive),

    Computed(Computed<Value>),
}

impl WatchSource {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(getter))
    }

    /// The getter to run, and whether the source forces a deep watch.
    fn into_getter(self) -> (Getter, bool) {
        match self {
            WatchSource::Getter(getter) => (getter, false),
            WatchSource::Reactive(proxy) => (Arc::new(move || Value::Proxy(proxy.clone())), true),
            WatchSource::Computed(computed) => (Arc::new(move || computed.get()), false),
        }
    }
}

impl From<Reactive> for WatchSource {
    fn from(proxy: Reactive) -> Self {
        WatchSource::Reactive(proxy)
    }
}

impl From<Computed<Value>> for WatchSource {
    fn from(computed: Computed<Value>) -> Self {
        WatchSource::Computed(computed)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Getter(_) => f.write_str("Getter"),
            WatchSource::Reactive(proxy) => f.debug_tuple("Reactive").field(proxy).finish(),
            WatchSource::Computed(computed) => {
                f.debug_tuple("Computed").field(&computed.id()).finish()
            }
        }
    }
}

struct WatchState {
    /// Value produced by the latest run.
    current: Mutex<Value>,

    /// Value the callback last saw.
    old: Mutex<Value>,
    callback: Callback,
    deep: bool,
}

impl WatchState {
    /// Rerun the getter and call back if the value changed.
    fn check(&self, effect: &Effect, force: bool) {
        if !effect.is_active() {
            return;
        }
        effect.run();

        let new = self.current.lock().clone();
        let old = std::mem::replace(&mut *self.old.lock(), new.clone());
        if force || self.deep || !new.same(&old) {
            untracked(|| (self.callback)(&new, &old));
        }
    }
}

/// Handle returned by [`watch`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    effect: Effect,
}

impl WatchHandle {
    /// Stop watching. Idempotent.
    pub fn unwatch(&self) {
        self.effect.dispose();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

/// Watch `source` and call `callback(new, old)` when it changes.
///
/// # Example
///
/// ```rust
/// use reflex_core::{reactive, watch, Value, WatchOptions, WatchSource};
/// use serde_json::json;
///
/// let state = reactive(&Value::from(json!({"count": 0}))).into_proxy().unwrap();
///
/// let reader = state.clone();
/// let handle = watch(
///     WatchSource::getter(move || reader.get("count")),
///     |new, old| println!("count: {old} -> {new}"),
///     WatchOptions::default(),
/// );
///
/// state.set("count", 1).unwrap(); // prints "count: 0 -> 1"
/// handle.unwatch();
/// ```
pub fn watch<F>(source: impl Into<WatchSource>, callback: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&Value, &Value) + Send + Sync + 'static,
{
    let (getter, implies_deep) = source.into().into_getter();
    let deep = options.deep || implies_deep;

    let state = Arc::new(WatchState {
        current: Mutex::new(Value::Undefined),
        old: Mutex::new(Value::Undefined),
        callback: Box::new(callback),
        deep,
    });

    let body = {
        let state = state.clone();
        move || {
            let value = getter();
            if deep {
                traverse(&value);
            }
            let previous = std::mem::replace(&mut *state.current.lock(), value);
            drop(previous);
        }
    };

    let scheduler = {
        let state = state.clone();
        move |effect: &Effect| {
            let effect = effect.clone();
            let state = state.clone();
            UpdateScheduler::schedule(effect.id(), Arc::new(move || state.check(&effect, false)));
        }
    };

    let effect = Effect::with_options(body, EffectOptions::default().lazy(true).scheduler(scheduler));

    if options.immediate {
        state.check(&effect, true);
    } else {
        effect.run();
        let initial = state.current.lock().clone();
        *state.old.lock() = initial;
    }

    WatchHandle { effect }
}

/// Read every key reachable from `value` through wrappers, so the running
/// effect depends on all of them.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<SourceId>) {
    let Value::Proxy(proxy) = value else {
        return;
    };
    if !seen.insert(proxy.id()) {
        return;
    }
    for key in proxy.keys() {
        traverse_inner(&proxy.get(key), seen);
    }
}
