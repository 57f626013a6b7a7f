//! Proxy Factory
//!
//! A [`Reactive`] is the wrapper through which a raw [`Target`] is read and
//! written. Reads made while an effect runs subscribe that effect; writes
//! re-run the effects that read what changed.
//!
//! # Identity
//!
//! There is exactly one live wrapper per (target, mode) pair. Each mode has
//! its own identity cache mapping a target's [`SourceId`] to a weak handle
//! of its wrapper, so the cache keeps neither the wrapper nor the target
//! alive. A target's `Drop` clears its entries.
//!
//! # Modes
//!
//! - reactive: tracks reads, triggers on writes, wraps nested objects on
//!   access
//! - shallow: like reactive, but nested objects are returned raw
//! - readonly: tracks reads, drops writes with a warning, nested objects come
//!   back readonly

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{ReactiveError, Result};
use crate::graph::{batch, SourceId};
use crate::value::{Key, Value};

use super::context::untracked;
use super::handlers::{trap_set, TrapSet};
use super::target::{Target, TargetKind};

/// Reactivity mode of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mode {
    pub readonly: bool,
    pub shallow: bool,
}

impl Mode {
    pub const REACTIVE: Mode = Mode {
        readonly: false,
        shallow: false,
    };
    pub const SHALLOW_REACTIVE: Mode = Mode {
        readonly: false,
        shallow: true,
    };
    pub const READONLY: Mode = Mode {
        readonly: true,
        shallow: false,
    };
    pub const SHALLOW_READONLY: Mode = Mode {
        readonly: true,
        shallow: true,
    };

    /// Readonly is stronger than mutable. Depth does not order modes.
    pub fn is_stronger_than(&self, other: Mode) -> bool {
        self.readonly && !other.readonly
    }

    fn cache_index(&self) -> usize {
        usize::from(self.readonly) * 2 + usize::from(self.shallow)
    }
}

type IdentityCache = DashMap<SourceId, Weak<ProxyInner>>;

static CACHES: OnceLock<[IdentityCache; 4]> = OnceLock::new();

fn cache(mode: Mode) -> &'static IdentityCache {
    let caches = CACHES.get_or_init(|| std::array::from_fn(|_| DashMap::new()));
    &caches[mode.cache_index()]
}

/// Remove every cached wrapper of a target.
pub(crate) fn forget_target(id: SourceId) {
    if let Some(caches) = CACHES.get() {
        for cache in caches {
            cache.remove(&id);
        }
    }
}

struct ProxyInner {
    target: Target,
    mode: Mode,
    traps: &'static dyn TrapSet,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        cache(self.mode).remove_if(&self.target.id(), |_, weak| weak.strong_count() == 0);
    }
}

/// A wrapper around a raw target.
///
/// Cloning a `Reactive` clones the handle; clones are the same wrapper.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ProxyInner>,
}

impl Reactive {
    /// Wrap a target in `mode`, reusing the live wrapper if there is one.
    ///
    /// Returns `None` for targets that may not be wrapped.
    pub fn wrap(target: &Target, mode: Mode) -> Option<Reactive> {
        let cache = cache(mode);
        let id = target.id();

        if let Some(existing) = cache.get(&id).and_then(|entry| entry.upgrade()) {
            return Some(Reactive { inner: existing });
        }

        let traps = trap_set(target.target_type())?;
        let create = || {
            Arc::new(ProxyInner {
                target: target.clone(),
                mode,
                traps,
            })
        };

        let inner = match cache.entry(id) {
            Entry::Occupied(mut occupied) => match occupied.get().upgrade() {
                Some(existing) => existing,
                None => {
                    let inner = create();
                    occupied.insert(Arc::downgrade(&inner));
                    inner
                }
            },
            Entry::Vacant(vacant) => {
                let inner = create();
                vacant.insert(Arc::downgrade(&inner));
                inner
            }
        };
        Some(Reactive { inner })
    }

    /// The raw target.
    pub fn raw(&self) -> &Target {
        &self.inner.target
    }

    /// The raw target's id, which is what dependencies are keyed on.
    pub fn id(&self) -> SourceId {
        self.inner.target.id()
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_reactive(&self) -> bool {
        !self.inner.mode.readonly
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.mode.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.mode.shallow
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a key, tracking it.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        self.inner.traps.get(self, &key.into())
    }

    /// Read a key and return it as a wrapper, if it holds a wrappable object.
    pub fn get_proxy(&self, key: impl Into<Key>) -> Option<Reactive> {
        self.get(key).into_proxy()
    }

    /// Write a key. Returns `Ok(false)` when the write was dropped because
    /// the wrapper is readonly.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        self.inner.traps.set(self, key.into(), value.into())
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.inner.traps.has(self, &key.into())
    }

    /// Remove a key. Returns `Ok(true)` if a key was removed.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        self.inner.traps.delete(self, &key.into())
    }

    /// Keys in order, tracking the key set.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.traps.own_keys(self)
    }

    /// Values in key order, each read through [`Reactive::get`].
    pub fn values(&self) -> Vec<Value> {
        self.keys().into_iter().map(|key| self.get(key)).collect()
    }

    /// Entries in key order, each value read through [`Reactive::get`].
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone());
                (key, value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.traps.len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a set member.
    pub fn add(&self, member: impl Into<Key>) -> Result<bool> {
        self.inner.traps.add(self, member.into())
    }

    /// Remove every entry of a map or set.
    pub fn clear(&self) -> Result<bool> {
        self.inner.traps.clear(self)
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Result<bool> {
        self.expect_kind(TargetKind::Array, "push")?;
        let end = self.raw().len();
        self.set(end, value)
    }

    /// Remove the last element of an array. Returns `Undefined` when the
    /// array is empty or the wrapper is readonly.
    pub fn pop(&self) -> Result<Value> {
        self.expect_kind(TargetKind::Array, "pop")?;
        let Some(last) = self.raw().len().checked_sub(1) else {
            return Ok(Value::Undefined);
        };
        let value = untracked(|| self.get(last));
        if self.delete(last)? {
            Ok(value)
        } else {
            Ok(Value::Undefined)
        }
    }

    /// Write several keys as one batch.
    pub fn assign<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        batch(|| -> Result<()> {
            for (key, value) in entries {
                self.set(key, value)?;
            }
            Ok(())
        })
    }

    fn expect_kind(&self, kind: TargetKind, op: &'static str) -> Result<()> {
        if self.kind() == kind {
            Ok(())
        } else {
            Err(ReactiveError::Unsupported {
                op,
                kind: self.kind().name(),
            })
        }
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.id())
            .field("kind", &self.kind())
            .field("readonly", &self.is_readonly())
            .field("shallow", &self.is_shallow())
            .finish()
    }
}

/// Wrap `value` in `mode`.
///
/// Primitives and targets that may not be wrapped come back unchanged. A
/// wrapper comes back unchanged unless `mode` is stronger than its own, in
/// which case the new wrapper observes the same raw target.
pub fn create_reactive_object(value: &Value, mode: Mode) -> Value {
    let target = match value {
        Value::Proxy(proxy) => {
            if !mode.is_stronger_than(proxy.mode()) {
                return value.clone();
            }
            proxy.raw().clone()
        }
        Value::Object(target) => target.clone(),
        _ => return value.clone(),
    };

    match Reactive::wrap(&target, mode) {
        Some(proxy) => Value::Proxy(proxy),
        None => Value::Object(target),
    }
}

/// Deeply reactive wrapper.
pub fn reactive(value: &Value) -> Value {
    create_reactive_object(value, Mode::REACTIVE)
}

/// Reactive wrapper whose nested objects stay raw.
pub fn shallow_reactive(value: &Value) -> Value {
    create_reactive_object(value, Mode::SHALLOW_REACTIVE)
}

/// Deeply readonly wrapper.
pub fn readonly(value: &Value) -> Value {
    create_reactive_object(value, Mode::READONLY)
}

/// Readonly wrapper whose nested objects stay raw.
pub fn shallow_readonly(value: &Value) -> Value {
    create_reactive_object(value, Mode::SHALLOW_READONLY)
}

pub fn is_reactive(value: &Value) -> bool {
    value.as_proxy().map_or(false, Reactive::is_reactive)
}

pub fn is_readonly(value: &Value) -> bool {
    value.as_proxy().map_or(false, Reactive::is_readonly)
}

pub fn is_shallow(value: &Value) -> bool {
    value.as_proxy().map_or(false, Reactive::is_shallow)
}

pub fn is_proxy(value: &Value) -> bool {
    value.as_proxy().is_some()
}

/// The raw target behind a wrapper; anything else is returned unchanged.
pub fn to_raw(value: &Value) -> Value {
    value.clone().into_raw()
}

/// Flag a target so it is never wrapped. Returns the value unchanged.
pub fn mark_raw(value: &Value) -> Value {
    if let Value::Object(target) = value {
        target.mark_raw();
    }
    value.clone()
}

/// Wrap a value read from a target so nested access stays observed.
pub(crate) fn wrap_nested(value: Value, mode: Mode) -> Value {
    if mode.shallow || !matches!(value, Value::Object(_)) {
        return value;
    }
    create_reactive_object(&value, mode)
}
