//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. A computed starts dirty. On first read it runs its getter inside its
//!    own lazy effect and caches the result.
//!
//! 2. While clean, reads return the cached value.
//!
//! 3. When a dependency changes, the effect's scheduler marks the computed
//!    dirty. It does not recompute. If the computed was clean, whoever read
//!    the computed is triggered in turn.
//!
//! 4. The next read recomputes once and clears the dirty flag.
//!
//! # Why This Matters
//!
//! Computed values that are never read stay dirty and cost nothing; a chain
//! of computed values only recomputes the links that are actually read.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::graph::{ChangeKind, DepKey, SourceId};

use super::context::untracked;
use super::effect::{Effect, EffectOptions};
use super::runtime::Runtime;

type Getter<T> = Arc<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Arc<dyn Fn(T) + Send + Sync>;

struct ComputedInner<T> {
    /// What readers of this computed track.
    id: SourceId,
    effect: Effect,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    value: Arc<Mutex<Option<T>>>,
    dirty: Arc<AtomicBool>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.dispose();
        Runtime::forget_source(self.id);
    }
}

/// A cached derived value that recomputes lazily.
///
/// Cloning a `Computed` clones the handle. The computed is disposed when the
/// last handle is dropped.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed from a getter. Nothing runs until the first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Arc::new(getter), None)
    }

    /// Create a writable computed. Writes go to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(Arc::new(getter), Some(Arc::new(setter)))
    }

    fn build(getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let id = SourceId::new();
        let value = Arc::new(Mutex::new(None));
        let dirty = Arc::new(AtomicBool::new(true));

        let body = {
            let getter = getter.clone();
            let value = value.clone();
            move || {
                let next = getter();
                let previous = value.lock().replace(next);
                drop(previous);
            }
        };

        let scheduler = {
            let dirty = dirty.clone();
            move |_: &Effect| {
                if !dirty.swap(true, Ordering::SeqCst) {
                    Runtime::trigger(id, Some(DepKey::Value), ChangeKind::Set);
                }
            }
        };

        let effect = Effect::with_options(
            body,
            EffectOptions::default()
                .lazy(true)
                .scheduler(scheduler)
                .computed(),
        );

        Self {
            inner: Arc::new(ComputedInner {
                id,
                effect,
                getter,
                setter,
                value,
                dirty,
            }),
        }
    }

    /// Get the current value, recomputing if a dependency changed.
    ///
    /// Inside an effect, the effect starts depending on this computed.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.id, DepKey::Value);

        if self.inner.dirty.swap(false, Ordering::SeqCst) {
            self.inner.effect.run();
        }

        if let Some(value) = self.inner.value.lock().clone() {
            return value;
        }
        // Disposed before the first read, or read from its own getter.
        untracked(|| (self.inner.getter)())
    }

    /// Write through the setter. Returns `false` for a getter-only computed.
    pub fn set(&self, value: T) -> bool {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                true
            }
            None => {
                warn!(computed = %self.inner.id, "write ignored: computed has no setter");
                false
            }
        }
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Check if the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Stop tracking. Later reads return the last cached value.
    pub fn dispose(&self) {
        self.inner.effect.dispose();
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// The effect the getter runs in.
    pub fn effect(&self) -> &Effect {
        &self.inner.effect
    }

    /// Number of times the getter ran.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.lock())
            .field("dirty", &self.is_dirty())
            .field("compute_count", &self.compute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
