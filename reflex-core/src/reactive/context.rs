//! Reactive Context
//!
//! The reactive context tracks which effect is currently running.
//! This enables automatic dependency tracking: when a wrapper is read,
//! the tracker subscribes the current effect to what was read.
//!
//! # Implementation
//!
//! We use a thread-local stack of running effects. Running an effect pushes
//! it; the returned guard pops it when dropped, including when the body
//! panics.
//!
//! This design supports nested contexts (e.g. a computed read from inside
//! another effect): the inner run collects into the inner effect, and the
//! outer effect is current again once it returns. An untracked frame
//! suspends tracking for everything above it.

use std::cell::RefCell;

use super::effect::Effect;
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Clone)]
struct ContextEntry {
    /// The running effect. `None` marks an untracked frame.
    effect: Option<Effect>,
}

impl ContextEntry {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        self.effect.as_ref().map(Effect::id)
    }
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// While this context is on top of the stack, reads subscribe `effect`.
    pub fn enter(effect: &Effect) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                effect: Some(effect.clone()),
            });
        });

        Self {
            subscriber_id: Some(effect.id()),
        }
    }

    /// Enter a frame in which reads are not tracked.
    pub fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry { effect: None });
        });

        Self {
            subscriber_id: None,
        }
    }

    /// Check if reads are currently tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or(false, |entry| entry.effect.is_some())
        })
    }

    /// The effect that reads subscribe right now, if any.
    pub fn current_effect() -> Option<Effect> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.effect.clone()))
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(ContextEntry::subscriber_id))
    }

    /// Whether the subscriber is anywhere on this thread's stack.
    pub fn is_running(id: SubscriberId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber_id() == Some(id))
        })
    }

    /// Number of frames on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber_id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                entry.subscriber_id()
            );
        }

        // The popped handle may be the last one; release it outside the borrow.
        drop(popped);
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}
