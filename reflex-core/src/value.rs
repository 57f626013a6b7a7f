//! Dynamic values
//!
//! Reactive targets hold [`Value`]s keyed by [`Key`]s. A value is either a
//! primitive, a raw object ([`Value::Object`]), or a wrapper handed out by the
//! proxy factory ([`Value::Proxy`]). Targets only ever store raw values: a
//! wrapper written into a target is replaced by its raw target first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};
use crate::graph::SourceId;
use crate::reactive::{Reactive, Target, TargetKind};

/// A dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent key, or "no previous value".
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A raw target.
    Object(Target),
    /// A wrapper around a raw target.
    Proxy(Reactive),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Raw objects and wrappers.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Reactive> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Reactive> {
        match self {
            Value::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Replace a wrapper with its raw target. Everything else is returned as is.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Proxy(proxy) => Value::Object(proxy.raw().clone()),
            other => other,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(target) => target.kind().name(),
            Value::Proxy(proxy) => proxy.kind().name(),
        }
    }

    /// Change detection used by writes and watchers.
    ///
    /// Primitives compare by value with `NaN` equal to itself and integers
    /// equal to floats of the same magnitude. Objects and wrappers compare by
    /// identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                b.fract() == 0.0
                    && *b >= i64::MIN as f64
                    && *b < i64::MAX as f64
                    && *b as i64 == *a
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            _ => false,
        }
    }

    /// Snapshot the value as JSON. Reads are untracked.
    ///
    /// Maps become JSON objects keyed by the display form of their keys and
    /// sets become arrays. `Undefined` becomes `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut path = Vec::new();
        to_json_inner(self, &mut path)
    }

    /// Text used by template interpolation: empty for `Undefined` and `Null`,
    /// JSON for objects.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Object(_) | Value::Proxy(_) => self
                .to_json()
                .map(|json| json.to_string())
                .unwrap_or_else(|_| format!("[{}]", self.type_name())),
            other => other.to_string(),
        }
    }
}

fn to_json_inner(value: &Value, path: &mut Vec<SourceId>) -> Result<serde_json::Value> {
    let target = match value {
        Value::Undefined | Value::Null => return Ok(serde_json::Value::Null),
        Value::Bool(b) => return Ok(serde_json::Value::Bool(*b)),
        Value::Int(i) => return Ok(serde_json::Value::from(*i)),
        Value::Float(f) => {
            return serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or(ReactiveError::NonFiniteNumber)
        }
        Value::Str(s) => return Ok(serde_json::Value::String(s.clone())),
        Value::Object(target) => target,
        Value::Proxy(proxy) => proxy.raw(),
    };

    if path.contains(&target.id()) {
        return Err(ReactiveError::Cycle);
    }
    path.push(target.id());

    let json = match target.kind() {
        TargetKind::Array => serde_json::Value::Array(
            target
                .values()
                .iter()
                .map(|item| to_json_inner(item, path))
                .collect::<Result<_>>()?,
        ),
        TargetKind::Set => serde_json::Value::Array(
            target
                .keys()
                .into_iter()
                .map(|key| to_json_inner(&Value::from(key), path))
                .collect::<Result<_>>()?,
        ),
        TargetKind::Object | TargetKind::Map => {
            let mut map = serde_json::Map::new();
            for (key, item) in target.entries() {
                map.insert(key.to_string(), to_json_inner(&item, path)?);
            }
            serde_json::Value::Object(map)
        }
    };

    path.pop();
    Ok(json)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(target) => write!(f, "[{} #{}]", target.kind().name(), target.id()),
            Value::Proxy(proxy) => write!(f, "[proxy {} #{}]", proxy.kind().name(), proxy.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<Reactive> for Value {
    fn from(proxy: Reactive) -> Self {
        Value::Proxy(proxy)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// JSON objects and arrays become fresh raw targets.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::array_from(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Object(Target::object_from(
                map.into_iter().map(|(k, v)| (Key::Str(k), Value::from(v))),
            )),
        }
    }
}

/// A property or collection key.
///
/// Array indices are `Key::Int`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Key {
    /// The key as an array index, if it is a non-negative integer.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Convert a primitive value into a key. Integral floats become `Int`.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(Key::Int(*f as i64)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Str(s.clone())
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}
