//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects wrappers, computed
//! values, and effects. It owns the dependency graph and hands triggered
//! effects to the scheduler.
//!
//! # How It Works
//!
//! 1. When a wrapper (or computed) is read while an effect runs, the runtime
//!    subscribes that effect to the entry that was read, and records the
//!    entry on the effect.
//!
//! 2. When a wrapper is written, the runtime:
//!    a. Snapshots every subscriber of the changed entries
//!    b. Skips effects that are running right now
//!    c. Marks computed subscribers dirty first
//!    d. Schedules the remaining effects
//!
//! 3. Before an effect reruns, or when it is disposed, the runtime removes it
//!    from every entry it was subscribed to.
//!
//! Steps 2c and 2d run inside one batch, so an effect that reads several
//! changed computed values still reruns once, after all of them are dirty.
//!
//! # Thread Safety
//!
//! The graph is process-wide behind a `parking_lot::RwLock`. The lock is
//! never held while user code runs, and handles removed from the graph are
//! dropped after it is released: dropping the last handle to a target
//! re-enters the runtime through [`Runtime::forget_source`].

use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::trace;

use crate::graph::{batch, ChangeKind, DepGraph, DepKey, DepRef, SourceId};

use super::context::ReactiveContext;
use super::effect::Effect;

static GRAPH: OnceLock<RwLock<DepGraph<Effect>>> = OnceLock::new();

fn graph() -> &'static RwLock<DepGraph<Effect>> {
    GRAPH.get_or_init(|| RwLock::new(DepGraph::new()))
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Subscribe the running effect to `(source, key)`.
    ///
    /// Does nothing outside an effect, inside an untracked frame, or when the
    /// running effect has been disposed. Repeat reads of the same entry in
    /// one run subscribe once.
    pub fn track(source: SourceId, key: DepKey) {
        let Some(effect) = ReactiveContext::current_effect() else {
            return;
        };
        if !effect.is_active() {
            return;
        }

        let dep = DepRef::new(source, key);
        let added = graph().write().subscribe(&dep, effect.id(), &effect);
        if added {
            trace!(effect = %effect.id(), source = %dep.source, key = ?dep.key, "track");
            effect.record_dependency(dep);
        }
    }

    /// Notify the subscribers of a change to `(source, key)`.
    ///
    /// `key` is `None` only for [`ChangeKind::Clear`].
    pub fn trigger(source: SourceId, key: Option<DepKey>, kind: ChangeKind) {
        Self::trigger_with(source, key, kind, false);
    }

    /// Like [`Runtime::trigger`]; `iterates_values` also notifies the
    /// iteration entry on `Set`, for sources whose iteration reads values.
    pub(crate) fn trigger_with(
        source: SourceId,
        key: Option<DepKey>,
        kind: ChangeKind,
        iterates_values: bool,
    ) {
        let subscribers = graph()
            .read()
            .collect(source, key.as_ref(), kind, iterates_values);
        if subscribers.is_empty() {
            return;
        }
        trace!(%source, ?key, ?kind, subscribers = subscribers.len(), "trigger");

        let mut computed = Vec::new();
        let mut effects = Vec::new();
        for (id, effect) in subscribers {
            if ReactiveContext::is_running(id) {
                trace!(effect = %id, "self-trigger suppressed");
                continue;
            }
            if effect.is_computed() {
                computed.push(effect);
            } else {
                effects.push(effect);
            }
        }

        batch(|| {
            for effect in computed.iter().chain(effects.iter()) {
                effect.schedule();
            }
        });
    }

    /// Unsubscribe an effect from every entry it is subscribed to.
    pub(crate) fn cleanup(effect: &Effect) {
        let deps = effect.take_dependencies();
        if deps.is_empty() {
            return;
        }

        let removed: Vec<Effect> = {
            let mut graph = graph().write();
            deps.iter()
                .filter_map(|dep| graph.unsubscribe(dep, effect.id()))
                .collect()
        };
        trace!(effect = %effect.id(), entries = deps.len(), "cleanup");
        drop(removed);
    }

    /// Drop every entry of a source that no longer exists.
    pub(crate) fn forget_source(source: SourceId) {
        let removed = graph().write().remove_source(source);
        drop(removed);
    }

    /// Number of effects subscribed to `(source, key)`.
    pub fn subscriber_count(source: SourceId, key: &DepKey) -> usize {
        graph()
            .read()
            .subscriber_count(&DepRef::new(source, key.clone()))
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
