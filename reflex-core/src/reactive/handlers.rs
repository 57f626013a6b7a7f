//! Wrapper Trap Sets
//!
//! Every read and write made through a [`Reactive`] is routed to the trap set
//! chosen when the wrapper was built:
//!
//! - [`BaseTraps`] for plain objects and arrays
//! - [`CollectionTraps`] for maps and sets
//!
//! Traps are where tracking and triggering happen. A read tracks the key it
//! read (or the iteration entry, for reads that depend on the whole key set);
//! a write applies the change to the raw target and then triggers with the
//! kind of change it made.

use tracing::warn;

use crate::error::{ReactiveError, Result};
use crate::graph::{ChangeKind, DepKey};
use crate::value::{Key, Value};

use super::proxy::{wrap_nested, Reactive};
use super::runtime::Runtime;
use super::target::{TargetKind, TargetType};

/// Operations a wrapper forwards to its trap set.
pub(crate) trait TrapSet: Send + Sync {
    fn get(&self, proxy: &Reactive, key: &Key) -> Value;

    fn set(&self, proxy: &Reactive, key: Key, value: Value) -> Result<bool>;

    fn has(&self, proxy: &Reactive, key: &Key) -> bool;

    fn delete(&self, proxy: &Reactive, key: &Key) -> Result<bool>;

    fn own_keys(&self, proxy: &Reactive) -> Vec<Key>;

    fn len(&self, proxy: &Reactive) -> usize;

    fn add(&self, proxy: &Reactive, _member: Key) -> Result<bool> {
        Err(ReactiveError::Unsupported {
            op: "add",
            kind: proxy.kind().name(),
        })
    }

    fn clear(&self, proxy: &Reactive) -> Result<bool> {
        Err(ReactiveError::Unsupported {
            op: "clear",
            kind: proxy.kind().name(),
        })
    }
}

/// Traps for plain objects and arrays.
pub(crate) struct BaseTraps;

/// Traps for maps and sets.
pub(crate) struct CollectionTraps;

static BASE_TRAPS: BaseTraps = BaseTraps;
static COLLECTION_TRAPS: CollectionTraps = CollectionTraps;

/// The trap set for a classification. Invalid targets have none.
pub(crate) fn trap_set(target_type: TargetType) -> Option<&'static dyn TrapSet> {
    match target_type {
        TargetType::Invalid => None,
        TargetType::Common => Some(&BASE_TRAPS),
        TargetType::Collection => Some(&COLLECTION_TRAPS),
    }
}

fn dropped_write(proxy: &Reactive, op: &'static str, key: Option<&Key>) {
    match key {
        Some(key) => warn!(
            target_id = %proxy.id(),
            op,
            key = %key,
            "write ignored: wrapper is readonly"
        ),
        None => warn!(target_id = %proxy.id(), op, "write ignored: wrapper is readonly"),
    }
}

/// Read `key`, tracking it, and wrap the result in the wrapper's mode.
fn tracked_get(proxy: &Reactive, key: &Key) -> Value {
    let value = proxy.raw().get(key).unwrap_or_default();
    Runtime::track(proxy.id(), DepKey::Key(key.clone()));
    wrap_nested(value, proxy.mode())
}

/// Write `key` on the raw target and trigger the change it made.
///
/// `iterates_values` is set for maps, whose iteration reads values.
fn write(proxy: &Reactive, key: Key, value: Value, iterates_values: bool) -> Result<bool> {
    if proxy.is_readonly() {
        dropped_write(proxy, "set", Some(&key));
        return Ok(false);
    }

    let raw = proxy.raw();
    let value = value.into_raw();
    let had_key = raw.contains(&key);
    let old = raw.insert(key.clone(), value.clone())?;

    let kind = match old {
        Some(ref old) if had_key && old.same(&value) => None,
        _ if had_key => Some(ChangeKind::Set),
        _ => Some(ChangeKind::Add),
    };
    if let Some(kind) = kind {
        Runtime::trigger_with(raw.id(), Some(DepKey::Key(key)), kind, iterates_values);
    }
    Ok(true)
}

fn remove(proxy: &Reactive, key: &Key) -> Result<bool> {
    if proxy.is_readonly() {
        dropped_write(proxy, "delete", Some(key));
        return Ok(false);
    }

    let removed = proxy.raw().remove(key)?;
    if removed.is_none() {
        return Ok(false);
    }
    Runtime::trigger(proxy.id(), Some(DepKey::Key(key.clone())), ChangeKind::Delete);
    Ok(true)
}

fn tracked_keys(proxy: &Reactive) -> Vec<Key> {
    Runtime::track(proxy.id(), DepKey::Iterate);
    proxy.raw().keys()
}

fn tracked_len(proxy: &Reactive) -> usize {
    Runtime::track(proxy.id(), DepKey::Iterate);
    proxy.raw().len()
}

impl TrapSet for BaseTraps {
    fn get(&self, proxy: &Reactive, key: &Key) -> Value {
        tracked_get(proxy, key)
    }

    fn set(&self, proxy: &Reactive, key: Key, value: Value) -> Result<bool> {
        write(proxy, key, value, false)
    }

    /// Membership depends on the whole key set.
    fn has(&self, proxy: &Reactive, key: &Key) -> bool {
        Runtime::track(proxy.id(), DepKey::Iterate);
        proxy.raw().contains(key)
    }

    fn delete(&self, proxy: &Reactive, key: &Key) -> Result<bool> {
        remove(proxy, key)
    }

    fn own_keys(&self, proxy: &Reactive) -> Vec<Key> {
        tracked_keys(proxy)
    }

    fn len(&self, proxy: &Reactive) -> usize {
        tracked_len(proxy)
    }
}

impl TrapSet for CollectionTraps {
    fn get(&self, proxy: &Reactive, key: &Key) -> Value {
        tracked_get(proxy, key)
    }

    fn set(&self, proxy: &Reactive, key: Key, value: Value) -> Result<bool> {
        if proxy.kind() == TargetKind::Set {
            return Err(ReactiveError::Unsupported {
                op: "set",
                kind: TargetKind::Set.name(),
            });
        }
        write(proxy, key, value, true)
    }

    /// Collections track membership per key.
    fn has(&self, proxy: &Reactive, key: &Key) -> bool {
        Runtime::track(proxy.id(), DepKey::Key(key.clone()));
        proxy.raw().contains(key)
    }

    fn delete(&self, proxy: &Reactive, key: &Key) -> Result<bool> {
        remove(proxy, key)
    }

    fn own_keys(&self, proxy: &Reactive) -> Vec<Key> {
        tracked_keys(proxy)
    }

    fn len(&self, proxy: &Reactive) -> usize {
        tracked_len(proxy)
    }

    fn add(&self, proxy: &Reactive, member: Key) -> Result<bool> {
        if proxy.kind() != TargetKind::Set {
            return Err(ReactiveError::Unsupported {
                op: "add",
                kind: proxy.kind().name(),
            });
        }
        if proxy.is_readonly() {
            dropped_write(proxy, "add", Some(&member));
            return Ok(false);
        }

        if !proxy.raw().add(member.clone())? {
            return Ok(false);
        }
        Runtime::trigger(proxy.id(), Some(DepKey::Key(member)), ChangeKind::Add);
        Ok(true)
    }

    fn clear(&self, proxy: &Reactive) -> Result<bool> {
        if proxy.is_readonly() {
            dropped_write(proxy, "clear", None);
            return Ok(false);
        }

        if proxy.raw().clear()? > 0 {
            Runtime::trigger(proxy.id(), None, ChangeKind::Clear);
        }
        Ok(true)
    }
}
