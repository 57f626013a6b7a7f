//! Raw Targets
//!
//! A [`Target`] is the raw data a wrapper observes: a plain object, an array,
//! a map, or a set. Targets are shared handles; cloning one clones the
//! handle, not the data, and identity is the allocation.
//!
//! Reading or writing a target directly is never tracked and never
//! triggers. Only writes made through a wrapper notify dependents.
//!
//! # Teardown
//!
//! The identity caches and the dependency graph refer to targets by
//! [`SourceId`] only. When the last handle to a target is dropped, its
//! cache and dependency entries are removed from `Drop`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::error::{ReactiveError, Result};
use crate::graph::SourceId;
use crate::value::{Key, Value};

use super::proxy;
use super::runtime::Runtime;

/// Largest run of `Undefined` padding a single array write may create.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

/// The shape of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
}

impl TargetKind {
    pub fn name(&self) -> &'static str {
        match self {
            TargetKind::Object => "object",
            TargetKind::Array => "array",
            TargetKind::Map => "map",
            TargetKind::Set => "set",
        }
    }

    /// Maps and sets use the collection trap set.
    pub fn is_collection(&self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::Set)
    }
}

/// How a value may be wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// Not wrappable: a primitive, a skip-flagged target, or a target that is
    /// no longer extensible.
    Invalid,

    /// Objects and arrays, observed through property access.
    Common,

    /// Maps and sets, observed through their collection methods.
    Collection,
}

/// Decide if and how a value may be wrapped.
///
/// A wrapper is classified by its raw target.
pub fn classify(value: &Value) -> TargetType {
    match value {
        Value::Object(target) => target.target_type(),
        Value::Proxy(proxy) => proxy.raw().target_type(),
        _ => TargetType::Invalid,
    }
}

#[derive(Debug)]
enum TargetData {
    Object(IndexMap<Key, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
}

impl TargetData {
    fn empty(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Object => TargetData::Object(IndexMap::new()),
            TargetKind::Array => TargetData::Array(Vec::new()),
            TargetKind::Map => TargetData::Map(IndexMap::new()),
            TargetKind::Set => TargetData::Set(IndexSet::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            TargetData::Object(map) | TargetData::Map(map) => map.len(),
            TargetData::Array(items) => items.len(),
            TargetData::Set(keys) => keys.len(),
        }
    }
}

struct TargetInner {
    id: SourceId,
    kind: TargetKind,
    data: RwLock<TargetData>,
    skip: AtomicBool,
    extensible: AtomicBool,
    frozen: AtomicBool,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        proxy::forget_target(self.id);
        Runtime::forget_source(self.id);
    }
}

/// A raw object, array, map, or set.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl Target {
    fn with_data(kind: TargetKind, data: TargetData) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id: SourceId::new(),
                kind,
                data: RwLock::new(data),
                skip: AtomicBool::new(false),
                extensible: AtomicBool::new(true),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// Create an empty target of the given kind.
    pub fn new(kind: TargetKind) -> Self {
        Self::with_data(kind, TargetData::empty(kind))
    }

    pub fn object() -> Self {
        Self::new(TargetKind::Object)
    }

    pub fn array() -> Self {
        Self::new(TargetKind::Array)
    }

    pub fn map() -> Self {
        Self::new(TargetKind::Map)
    }

    pub fn set() -> Self {
        Self::new(TargetKind::Set)
    }

    pub fn object_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        Self::with_data(TargetKind::Object, TargetData::Object(collect_entries(entries)))
    }

    pub fn array_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        let items = items.into_iter().map(|item| item.into().into_raw()).collect();
        Self::with_data(TargetKind::Array, TargetData::Array(items))
    }

    pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        Self::with_data(TargetKind::Map, TargetData::Map(collect_entries(entries)))
    }

    pub fn set_from<K: Into<Key>>(members: impl IntoIterator<Item = K>) -> Self {
        let members = members.into_iter().map(Into::into).collect();
        Self::with_data(TargetKind::Set, TargetData::Set(members))
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Classify this target for wrapping.
    pub fn target_type(&self) -> TargetType {
        if self.is_skipped() || !self.is_extensible() {
            TargetType::Invalid
        } else if self.kind().is_collection() {
            TargetType::Collection
        } else {
            TargetType::Common
        }
    }

    /// Flag the target so it is never wrapped.
    pub fn mark_raw(&self) {
        self.inner.skip.store(true, Ordering::SeqCst);
    }

    pub fn is_skipped(&self) -> bool {
        self.inner.skip.load(Ordering::SeqCst)
    }

    /// Forbid adding keys. Existing keys stay writable.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.store(false, Ordering::SeqCst);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.load(Ordering::SeqCst)
    }

    /// Forbid every write.
    pub fn freeze(&self) {
        self.prevent_extensions();
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a key. Set members read as their own key.
    pub fn get(&self, key: &Key) -> Option<Value> {
        match &*self.inner.data.read() {
            TargetData::Object(map) | TargetData::Map(map) => map.get(key).cloned(),
            TargetData::Array(items) => key.as_index().and_then(|index| items.get(index).cloned()),
            TargetData::Set(members) => members.contains(key).then(|| Value::from(key.clone())),
        }
    }

    /// Whether the key is present. Array holes are absent.
    pub fn contains(&self, key: &Key) -> bool {
        match &*self.inner.data.read() {
            TargetData::Object(map) | TargetData::Map(map) => map.contains_key(key),
            TargetData::Array(items) => key
                .as_index()
                .and_then(|index| items.get(index))
                .map_or(false, |item| !item.is_undefined()),
            TargetData::Set(members) => members.contains(key),
        }
    }

    /// Keys in insertion order; indices for arrays.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.data.read() {
            TargetData::Object(map) | TargetData::Map(map) => map.keys().cloned().collect(),
            TargetData::Array(items) => (0..items.len()).map(Key::from).collect(),
            TargetData::Set(members) => members.iter().cloned().collect(),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        match &*self.inner.data.read() {
            TargetData::Object(map) | TargetData::Map(map) => map.values().cloned().collect(),
            TargetData::Array(items) => items.clone(),
            TargetData::Set(members) => members.iter().cloned().map(Value::from).collect(),
        }
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &*self.inner.data.read() {
            TargetData::Object(map) | TargetData::Map(map) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            TargetData::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| (Key::from(index), item.clone()))
                .collect(),
            TargetData::Set(members) => members
                .iter()
                .map(|member| (member.clone(), Value::from(member.clone())))
                .collect(),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_frozen() {
            Err(ReactiveError::Frozen)
        } else {
            Ok(())
        }
    }

    fn check_extensible(&self, key: &Key) -> Result<()> {
        if self.is_extensible() {
            Ok(())
        } else {
            Err(ReactiveError::NotExtensible(key.to_string()))
        }
    }

    /// Write a key and return the previous value, `None` if the key was absent.
    ///
    /// Wrappers are stored as their raw target. Writing past the end of an
    /// array pads it with `Undefined`, at most [`MAX_ARRAY_GAP`] slots at a
    /// time.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let value = value.into().into_raw();
        self.check_writable()?;

        let mut data = self.inner.data.write();
        match &mut *data {
            TargetData::Object(map) | TargetData::Map(map) => {
                if !map.contains_key(&key) {
                    self.check_extensible(&key)?;
                }
                Ok(map.insert(key, value))
            }
            TargetData::Array(items) => {
                let index = key.as_index().ok_or(ReactiveError::Unsupported {
                    op: "non-index key",
                    kind: "array",
                })?;
                if index < items.len() {
                    return Ok(Some(std::mem::replace(&mut items[index], value)));
                }
                self.check_extensible(&key)?;
                if index - items.len() > MAX_ARRAY_GAP {
                    return Err(ReactiveError::Unsupported {
                        op: "sparse index",
                        kind: "array",
                    });
                }
                items
                    .try_reserve(index + 1 - items.len())
                    .map_err(|_| ReactiveError::Unsupported {
                        op: "grow",
                        kind: "array",
                    })?;
                items.resize(index, Value::Undefined);
                items.push(value);
                Ok(None)
            }
            TargetData::Set(_) => Err(ReactiveError::Unsupported {
                op: "insert",
                kind: "set",
            }),
        }
    }

    /// Add a member to a set. Returns `false` if it was already present.
    pub fn add(&self, member: impl Into<Key>) -> Result<bool> {
        let member = member.into();
        self.check_writable()?;

        let mut data = self.inner.data.write();
        match &mut *data {
            TargetData::Set(members) => {
                if members.contains(&member) {
                    return Ok(false);
                }
                self.check_extensible(&member)?;
                Ok(members.insert(member))
            }
            _ => Err(ReactiveError::Unsupported {
                op: "add",
                kind: self.kind().name(),
            }),
        }
    }

    /// Remove a key and return its value, `None` if it was absent.
    ///
    /// Removing the last array slot shortens the array; removing any other
    /// slot leaves a hole.
    pub fn remove(&self, key: &Key) -> Result<Option<Value>> {
        self.check_writable()?;

        let mut data = self.inner.data.write();
        let removed = match &mut *data {
            TargetData::Object(map) | TargetData::Map(map) => map.shift_remove(key),
            TargetData::Array(items) => match key.as_index() {
                Some(index) if index + 1 == items.len() => items.pop(),
                Some(index) if index < items.len() && !items[index].is_undefined() => {
                    Some(std::mem::take(&mut items[index]))
                }
                _ => None,
            },
            TargetData::Set(members) => members
                .shift_remove(key)
                .then(|| Value::from(key.clone())),
        };
        Ok(removed)
    }

    /// Remove every key. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        self.check_writable()?;

        let previous = {
            let mut data = self.inner.data.write();
            std::mem::replace(&mut *data, TargetData::empty(self.kind()))
        };
        // Drop the old contents after the lock is released.
        Ok(previous.len())
    }
}

fn collect_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> IndexMap<Key, Value>
where
    K: Into<Key>,
    V: Into<Value>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into().into_raw()))
        .collect()
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}
