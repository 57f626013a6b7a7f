//! Effect Implementation
//!
//! An Effect is a tracked computation that reruns whenever what it read
//! changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. When any dependency changes, the effect is scheduled to rerun.
//!
//! 3. Before rerunning, the effect is removed from every entry it was
//!    subscribed to, and subscribes again to whatever this run reads.
//!
//! # Scheduling
//!
//! An effect created with a scheduler hands itself to the scheduler instead
//! of rerunning. Computed values and watchers are built this way. A plain
//! effect reruns at once, or once at the end of the enclosing
//! [`batch`](crate::graph::batch).
//!
//! # Lifetime
//!
//! `Created → Active → Disposed`. Dropping a handle does not dispose the
//! effect: while it has dependencies, the graph keeps it alive and it keeps
//! rerunning. Call [`Effect::dispose`] to stop it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graph::{DepRef, UpdateScheduler};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::SubscriberId;

/// Called with the effect instead of rerunning it.
pub type Scheduler = Arc<dyn Fn(&Effect) + Send + Sync>;

/// Options for [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
    computed: bool,
}

impl EffectOptions {
    /// Don't run the effect on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Hand the effect to `scheduler` when a dependency changes.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub(crate) fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

struct EffectInner {
    id: SubscriberId,
    body: Box<dyn Fn() + Send + Sync>,
    scheduler: Option<Scheduler>,
    computed: bool,

    /// Entries this effect is subscribed to.
    deps: Mutex<SmallVec<[DepRef; 4]>>,
    active: AtomicBool,
    run_count: AtomicUsize,
}

/// A tracked computation that reruns when its dependencies change.
///
/// # Example
///
/// ```rust
/// use reflex_core::{reactive, Effect, Value};
/// use serde_json::json;
///
/// let state = reactive(&Value::from(json!({"count": 0}))).into_proxy().unwrap();
///
/// let reader = state.clone();
/// let effect = Effect::new(move || {
///     println!("count is {}", reader.get("count"));
/// });
///
/// state.set("count", 5).unwrap(); // prints "count is 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given body.
    ///
    /// The body runs immediately to establish dependencies.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(body, EffectOptions::default())
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(body, EffectOptions::default().lazy(true))
    }

    pub fn with_options<F>(body: F, options: EffectOptions) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: SubscriberId::new(),
                body: Box::new(body),
                scheduler: options.scheduler,
                computed: options.computed,
                deps: Mutex::new(SmallVec::new()),
                active: AtomicBool::new(true),
                run_count: AtomicUsize::new(0),
            }),
        };
        debug!(effect = %effect.id(), lazy = options.lazy, "effect created");

        if !options.lazy {
            effect.run();
        }
        effect
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Whether this effect backs a computed value.
    pub fn is_computed(&self) -> bool {
        self.inner.computed
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run the body, rebuilding dependencies from scratch.
    ///
    /// Does nothing once disposed, or if this effect is already running on
    /// this thread.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }
        if ReactiveContext::is_running(self.id()) {
            trace!(effect = %self.id(), "recursive run skipped");
            return;
        }

        Runtime::cleanup(self);

        let _ctx = ReactiveContext::enter(self);
        (self.inner.body)();
        self.inner.run_count.fetch_add(1, Ordering::SeqCst);
    }

    /// React to a dependency change.
    pub fn schedule(&self) {
        if !self.is_active() {
            return;
        }
        match &self.inner.scheduler {
            Some(scheduler) => scheduler(self),
            None => {
                let effect = self.clone();
                UpdateScheduler::schedule(self.id(), Arc::new(move || effect.run()));
            }
        }
    }

    /// Stop the effect and unsubscribe it everywhere.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            Runtime::cleanup(self);
            debug!(effect = %self.id(), runs = self.run_count(), "effect disposed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        !self.is_active()
    }

    /// Get the number of times the body ran to completion.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of entries the effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }

    pub(crate) fn record_dependency(&self, dep: DepRef) {
        self.inner.deps.lock().push(dep);
    }

    pub(crate) fn take_dependencies(&self) -> SmallVec<[DepRef; 4]> {
        std::mem::take(&mut *self.inner.deps.lock())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
