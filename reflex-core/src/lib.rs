//! Reflex Core
//!
//! This crate provides a reactive state engine. It wraps plain data so that
//! reads made inside a tracked computation are recorded as dependencies,
//! and writes to the same locations rerun every computation that depends on
//! them.
//!
//! It implements:
//!
//! - Reactive wrappers over objects, arrays, maps, and sets
//! - Effects, computed values, and watchers
//! - Batched, deduplicated reruns
//! - An instance layer with forwarded properties, events, and templates
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic values wrappers hold
//! - `reactive`: wrappers, effects, and dependency tracking
//! - `graph`: the dependency graph and the batch scheduler
//! - `instance`: property forwarding, events, and template rendering
//!
//! # Example
//!
//! ```rust
//! use reflex_core::{reactive, Computed, Effect, Value};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // Wrap some data
//! let state = reactive(&Value::from(json!({"count": 0}))).into_proxy().unwrap();
//!
//! // Create a derived value
//! let reader = state.clone();
//! let doubled = Computed::new(move || reader.get("count").as_int().unwrap_or(0) * 2);
//!
//! // Create an effect
//! let reader = state.clone();
//! let shown = doubled.clone();
//! let effect = Effect::new(move || {
//!     println!("Count: {}, Doubled: {}", reader.get("count"), shown.get());
//! });
//!
//! // Update the data
//! state.set("count", 5).unwrap();
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! assert_eq!(doubled.get(), 10);
//! effect.dispose();
//! ```

pub mod error;
pub mod graph;
pub mod instance;
pub mod reactive;
pub mod value;

#[cfg(feature = "python")]
mod python;

pub use error::{ReactiveError, Result};
pub use graph::batch;
pub use instance::{template, Emitter, Instance, ListenerId, Method};
pub use reactive::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, untracked, watch, Computed, Effect,
    EffectOptions, Reactive, Target, TargetKind, WatchHandle, WatchOptions, WatchSource,
};
pub use value::{Key, Value};
