//! Event Emitter
//!
//! Maps event names to ordered lists of listeners. Independent of the
//! reactive core: emitting never tracks and never triggers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::value::Value;

/// A registered callback.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle used to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

/// String-keyed event listeners.
#[derive(Default)]
pub struct Emitter {
    events: RwLock<IndexMap<String, Vec<Registration>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, event: &str, id: ListenerId, once: bool, listener: Listener) {
        self.events
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Registration { id, once, listener });
    }

    /// Add a listener. Listeners run in registration order.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.register(event, id, false, Arc::new(listener));
        id
    }

    /// Add one listener to several events. The returned id removes it from
    /// any of them.
    pub fn on_many<F>(&self, events: &[&str], listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        let listener: Listener = Arc::new(listener);
        for event in events {
            self.register(event, id, false, listener.clone());
        }
        id
    }

    /// Add a listener that is removed before its first call.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.register(event, id, true, Arc::new(listener));
        id
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let removed = {
            let mut events = self.events.write();
            let Some(registrations) = events.get_mut(event) else {
                return false;
            };
            let removed = registrations
                .iter()
                .position(|registration| registration.id == id)
                .map(|index| registrations.remove(index));
            if registrations.is_empty() {
                events.shift_remove(event);
            }
            removed
        };
        removed.is_some()
    }

    /// Remove every listener of an event. Returns how many were removed.
    pub fn off_event(&self, event: &str) -> usize {
        let removed = self.events.write().shift_remove(event);
        removed.map_or(0, |registrations| registrations.len())
    }

    /// Remove every listener.
    pub fn off_all(&self) {
        let removed = std::mem::take(&mut *self.events.write());
        drop(removed);
    }

    /// Call the listeners of `event` with `args`. Returns how many ran.
    ///
    /// Listeners added or removed by a listener take effect from the next
    /// emit.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let listeners: Vec<Listener> = {
            let mut events = self.events.write();
            let Some(registrations) = events.get_mut(event) else {
                return 0;
            };
            let listeners = registrations
                .iter()
                .map(|registration| registration.listener.clone())
                .collect();
            registrations.retain(|registration| !registration.once);
            if registrations.is_empty() {
                events.shift_remove(event);
            }
            listeners
        };

        trace!(event, listeners = listeners.len(), "emit");
        for listener in &listeners {
            listener(args);
        }
        listeners.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.events.read().get(event).map_or(0, Vec::len)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.read();
        f.debug_map()
            .entries(events.iter().map(|(event, registrations)| (event, registrations.len())))
            .finish()
    }
}
