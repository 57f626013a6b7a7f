//! Instance Property Bridge
//!
//! An [`Instance`] owns a reactive data store and exposes its top-level keys
//! as properties, next to computed properties, per-property watchers, an
//! event emitter, and template rendering.
//!
//! # Properties
//!
//! Every top-level key of the data present at creation becomes a forwarding
//! property: reading it reads the store wrapper (and is tracked), writing it
//! writes the store wrapper (and triggers). Keys starting with `$` or `_`
//! are reserved and are not forwarded. Keys added to the store later are
//! reachable through [`Instance::data`] only.
//!
//! Methods share the property namespace. They are invoked with
//! [`Instance::call`] and receive the instance and the call arguments.
//!
//! # Rendering
//!
//! [`Instance::mount`] renders a `{{ name }}` template inside an effect and
//! hands the result to a sink. Any property the template read reruns the
//! render when it changes.

pub mod emitter;
pub mod template;

pub use emitter::{Emitter, Listener, ListenerId};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ReactiveError, Result};
use crate::reactive::{
    reactive, untracked, Computed, Effect, Reactive, TargetKind, WatchHandle, WatchOptions,
    WatchSource,
};
use crate::value::{Key, Value};

/// Prefixes of names that are never forwarded.
pub const RESERVED_PREFIXES: [char; 2] = ['$', '_'];

fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIXES)
}

/// A method bound to an instance.
pub type Method = Arc<dyn Fn(&Instance, &[Value]) -> Value + Send + Sync>;

#[derive(Clone)]
enum Accessor {
    Data(Key),
    Computed(Computed<Value>),
    Method(Method),
}

impl Accessor {
    fn kind(&self) -> &'static str {
        match self {
            Accessor::Data(_) => "data property",
            Accessor::Computed(_) => "computed property",
            Accessor::Method(_) => "method",
        }
    }
}

struct Bridge {
    data: Reactive,
    accessors: RwLock<IndexMap<String, Accessor>>,
}

/// An object that forwards properties to a reactive store.
///
/// Cloning an `Instance` clones the handle.
#[derive(Clone)]
pub struct Instance {
    uid: u64,
    bridge: Arc<Bridge>,
    events: Arc<Emitter>,
}

impl Instance {
    /// Create an instance over a plain object.
    ///
    /// The object is wrapped with [`reactive`]; a wrapper of it may be passed
    /// as well. Anything else is [`ReactiveError::InvalidData`].
    pub fn new(data: impl Into<Value>) -> Result<Self> {
        let data = data.into();
        let kind = match &data {
            Value::Object(target) => target.kind(),
            Value::Proxy(proxy) => proxy.kind(),
            other => return Err(ReactiveError::InvalidData(other.type_name().to_string())),
        };
        if kind != TargetKind::Object {
            return Err(ReactiveError::InvalidData(kind.name().to_string()));
        }

        let store = reactive(&data.into_raw()).into_proxy().ok_or_else(|| {
            ReactiveError::InvalidData("object cannot be observed".to_string())
        })?;

        let accessors = store
            .raw()
            .keys()
            .into_iter()
            .filter_map(|key| {
                let name = key.to_string();
                (!is_reserved(&name)).then(|| (name, Accessor::Data(key)))
            })
            .collect();

        let instance = Self {
            uid: next_uid(),
            bridge: Arc::new(Bridge {
                data: store,
                accessors: RwLock::new(accessors),
            }),
            events: Arc::new(Emitter::new()),
        };
        debug!(uid = instance.uid, properties = instance.keys().len(), "instance created");
        Ok(instance)
    }

    /// Create an instance from a data factory. The factory runs untracked
    /// and must return a plain object.
    pub fn from_factory<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Value,
    {
        Self::new(untracked(factory))
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The store wrapper.
    pub fn data(&self) -> &Reactive {
        &self.bridge.data
    }

    /// Property names in definition order: data properties first.
    pub fn keys(&self) -> Vec<String> {
        self.bridge.accessors.read().keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.bridge.accessors.read().contains_key(name)
    }

    fn accessor(&self, name: &str) -> Result<Accessor> {
        self.bridge
            .accessors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ReactiveError::UnknownProperty(name.to_string()))
    }

    /// Read a property. Methods cannot be read.
    pub fn get(&self, name: &str) -> Result<Value> {
        match self.accessor(name)? {
            Accessor::Data(key) => Ok(self.bridge.data.get(key)),
            Accessor::Computed(computed) => Ok(computed.get()),
            accessor @ Accessor::Method(_) => Err(ReactiveError::Unsupported {
                op: "get",
                kind: accessor.kind(),
            }),
        }
    }

    /// Write a property. Returns `Ok(false)` when a computed property has no
    /// setter.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        match self.accessor(name)? {
            Accessor::Data(key) => self.bridge.data.set(key, value),
            Accessor::Computed(computed) => Ok(computed.set(value.into())),
            accessor @ Accessor::Method(_) => Err(ReactiveError::Unsupported {
                op: "set",
                kind: accessor.kind(),
            }),
        }
    }

    /// Define a method. Reserved and already-defined names are rejected.
    pub fn define_method<F>(&self, name: &str, method: F) -> Result<()>
    where
        F: Fn(&Instance, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.check_new_property(name)?;
        self.bridge
            .accessors
            .write()
            .insert(name.to_string(), Accessor::Method(Arc::new(method)));
        Ok(())
    }

    /// Call a method with `args`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.accessor(name)? {
            Accessor::Method(method) => Ok(method(self, args)),
            accessor => Err(ReactiveError::Unsupported {
                op: "call",
                kind: accessor.kind(),
            }),
        }
    }

    fn check_new_property(&self, name: &str) -> Result<()> {
        if is_reserved(name) {
            return Err(ReactiveError::InvalidData(format!(
                "property `{name}` uses a reserved prefix"
            )));
        }
        if self.has(name) {
            return Err(ReactiveError::InvalidData(format!(
                "property `{name}` is already defined"
            )));
        }
        Ok(())
    }

    fn insert_computed(&self, name: &str, computed: Computed<Value>) -> Result<Computed<Value>> {
        self.check_new_property(name)?;
        self.bridge
            .accessors
            .write()
            .insert(name.to_string(), Accessor::Computed(computed.clone()));
        Ok(computed)
    }

    /// Define a getter-only computed property. The getter receives the store
    /// wrapper.
    pub fn define_computed<F>(&self, name: &str, getter: F) -> Result<Computed<Value>>
    where
        F: Fn(&Reactive) -> Value + Send + Sync + 'static,
    {
        let data = self.bridge.data.clone();
        self.insert_computed(name, Computed::new(move || getter(&data)))
    }

    /// Define a computed property whose writes call `setter`.
    pub fn define_computed_with_setter<F, S>(
        &self,
        name: &str,
        getter: F,
        setter: S,
    ) -> Result<Computed<Value>>
    where
        F: Fn(&Reactive) -> Value + Send + Sync + 'static,
        S: Fn(&Reactive, Value) + Send + Sync + 'static,
    {
        let read = self.bridge.data.clone();
        let write = self.bridge.data.clone();
        self.insert_computed(
            name,
            Computed::with_setter(move || getter(&read), move |value| setter(&write, value)),
        )
    }

    /// Watch a property.
    pub fn watch<F>(&self, name: &str, callback: F, options: WatchOptions) -> Result<WatchHandle>
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let source = match self.accessor(name)? {
            Accessor::Data(key) => {
                let data = self.bridge.data.clone();
                WatchSource::getter(move || data.get(key.clone()))
            }
            Accessor::Computed(computed) => WatchSource::Computed(computed),
            accessor @ Accessor::Method(_) => {
                return Err(ReactiveError::Unsupported {
                    op: "watch",
                    kind: accessor.kind(),
                })
            }
        };
        Ok(crate::reactive::watch(source, callback, options))
    }

    /// Render a template against this instance's properties. Unknown names
    /// render empty.
    pub fn render(&self, template: &str) -> String {
        template::interpolate(template, |name| self.get(name).unwrap_or_default())
    }

    /// Render `template` into `sink` now and after every change to what it
    /// read. Dispose the returned effect to unmount.
    pub fn mount<S>(&self, template: &str, sink: S) -> Effect
    where
        S: Fn(&str) + Send + Sync + 'static,
    {
        let instance = self.clone();
        let template = template.to_string();
        debug!(uid = self.uid, "instance mounted");
        Effect::new(move || sink(&instance.render(&template)))
    }

    pub fn events(&self) -> &Emitter {
        &self.events
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.events.on(event, listener)
    }

    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.events.once(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    pub fn off_event(&self, event: &str) -> usize {
        self.events.off_event(event)
    }

    pub fn off_all(&self) {
        self.events.off_all()
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        self.events.emit(event, args)
    }
}

fn next_uid() -> u64 {
    static UID: AtomicU64 = AtomicU64::new(0);
    UID.fetch_add(1, Ordering::Relaxed)
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("uid", &self.uid)
            .field("properties", &self.keys())
            .field("events", &self.events)
            .finish()
    }
}
