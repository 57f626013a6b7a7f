//! Graph Nodes
//!
//! This module defines the identifiers that dependency entries are keyed on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Key;

/// Unique identifier for a dependency source.
///
/// Every raw target and every computed value gets one. Dependency entries
/// are keyed by `(SourceId, DepKey)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The second half of a dependency entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A single property or collection key.
    Key(Key),

    /// The key set of a source as a whole: membership, enumeration, length.
    /// Adding or removing a key triggers it.
    Iterate,

    /// The value of a computed.
    Value,
}

impl From<Key> for DepKey {
    fn from(key: Key) -> Self {
        DepKey::Key(key)
    }
}

/// What a write did to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A key that did not exist was added.
    Add,

    /// An existing key got a different value.
    Set,

    /// An existing key was removed.
    Delete,

    /// Every key was removed at once.
    Clear,
}

impl ChangeKind {
    /// Whether the change alters the key set of its source.
    pub fn is_structural(&self) -> bool {
        !matches!(self, ChangeKind::Set)
    }
}

/// A fully-qualified dependency entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepRef {
    pub source: SourceId,
    pub key: DepKey,
}

impl DepRef {
    pub fn new(source: SourceId, key: impl Into<DepKey>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }
}
