//! Reactive Primitives
//!
//! This module implements the core reactive system: wrappers, effects,
//! computed values, and watchers.
//!
//! # Concepts
//!
//! ## Wrappers
//!
//! A [`Reactive`] wraps a raw [`Target`] (object, array, map, or set). Reads
//! through the wrapper made while an effect runs register that effect as a
//! dependent of what was read. Writes through the wrapper rerun every
//! dependent of what changed. Nested objects are wrapped lazily, when they
//! are read.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that reruns whenever what it read changes.
//! Effects synchronize reactive state with the outside world, such as
//! re-rendering a template.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result and recomputes
//! only when read after one of its dependencies changed.
//!
//! ## Watchers
//!
//! [`watch`] calls back with the new and the old value of a source whenever
//! it changes.
//!
//! # Implementation Notes
//!
//! The system uses a thread-local stack of running effects to detect
//! dependencies automatically: when a wrapper is read, the runtime checks
//! the top of the stack and, if an effect is running, registers it.
//!
//! This approach (sometimes called "transparent reactivity") is the one used
//! by Vue 3, SolidJS, and Leptos.

mod computed;
mod context;
mod effect;
mod handlers;
mod proxy;
mod runtime;
mod subscriber;
mod target;
mod watch;

pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use effect::{Effect, EffectOptions, Scheduler};
pub use proxy::{
    create_reactive_object, is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive,
    readonly, shallow_reactive, shallow_readonly, to_raw, Mode, Reactive,
};
pub use runtime::Runtime;
pub use subscriber::SubscriberId;
pub use target::{classify, Target, TargetKind, TargetType};
pub use watch::{traverse, watch, WatchHandle, WatchOptions, WatchSource};
