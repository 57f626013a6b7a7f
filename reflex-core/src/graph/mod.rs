//! Dependency Graph
//!
//! This module stores which subscribers depend on which parts of which
//! sources.
//!
//! # Overview
//!
//! The graph is a two-level mapping:
//!
//! - source (a raw target or a computed) → dependency key → subscribers
//!
//! The reverse direction (which entries a subscriber is subscribed to) is
//! kept on the subscriber itself, see [`crate::reactive::Effect`].
//!
//! Subscribers are kept in insertion order so that reruns happen in the order
//! effects first subscribed. Sources and keys are unordered; empty ones are
//! swap-removed. Collecting subscribers for a change always
//! produces an owned, deduplicated snapshot: callers notify from the snapshot,
//! never from the live sets, so subscriptions may change while notification
//! is in progress.

mod node;
pub mod scheduler;

pub use node::{ChangeKind, DepKey, DepRef, SourceId};
pub use scheduler::{batch, UpdateScheduler};

use indexmap::IndexMap;

use crate::reactive::SubscriberId;

/// Subscribers of a single dependency entry.
pub type Subscribers<S> = IndexMap<SubscriberId, S>;

/// All dependency entries of one source.
pub type SourceDeps<S> = IndexMap<DepKey, Subscribers<S>>;

/// The dependency graph.
///
/// `S` is the subscriber handle stored per entry. The runtime stores
/// [`crate::reactive::Effect`] handles.
#[derive(Debug)]
pub struct DepGraph<S> {
    sources: IndexMap<SourceId, SourceDeps<S>>,
}

impl<S: Clone> DepGraph<S> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            sources: IndexMap::new(),
        }
    }

    /// Add a subscriber to an entry.
    ///
    /// Returns `false` if the subscriber was already subscribed to it.
    pub fn subscribe(&mut self, dep: &DepRef, id: SubscriberId, subscriber: &S) -> bool {
        let subscribers = self
            .sources
            .entry(dep.source)
            .or_default()
            .entry(dep.key.clone())
            .or_default();

        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, subscriber.clone());
        true
    }

    /// Remove a subscriber from an entry, dropping empty entries.
    ///
    /// The removed handle is returned so the caller decides where it is
    /// dropped.
    pub fn unsubscribe(&mut self, dep: &DepRef, id: SubscriberId) -> Option<S> {
        let keys = self.sources.get_mut(&dep.source)?;
        let subscribers = keys.get_mut(&dep.key)?;
        let removed = subscribers.shift_remove(&id);

        if subscribers.is_empty() {
            keys.swap_remove(&dep.key);
        }
        if keys.is_empty() {
            self.sources.swap_remove(&dep.source);
        }
        removed
    }

    /// Collect the subscribers a change must notify.
    ///
    /// - `Set` notifies the entry of `key`, plus `Iterate` when
    ///   `iterates_values` is set (map iteration yields values).
    /// - `Add` and `Delete` notify the entry of `key` and `Iterate`.
    /// - `Clear` notifies every entry of the source.
    pub fn collect(
        &self,
        source: SourceId,
        key: Option<&DepKey>,
        kind: ChangeKind,
        iterates_values: bool,
    ) -> Subscribers<S> {
        let mut collected = Subscribers::new();
        let Some(keys) = self.sources.get(&source) else {
            return collected;
        };

        if kind == ChangeKind::Clear {
            for subscribers in keys.values() {
                extend(&mut collected, subscribers);
            }
            return collected;
        }

        if let Some(subscribers) = key.and_then(|key| keys.get(key)) {
            extend(&mut collected, subscribers);
        }
        if kind.is_structural() || iterates_values {
            if let Some(subscribers) = keys.get(&DepKey::Iterate) {
                extend(&mut collected, subscribers);
            }
        }
        collected
    }

    /// Remove every entry of a source.
    pub fn remove_source(&mut self, source: SourceId) -> Option<SourceDeps<S>> {
        self.sources.swap_remove(&source)
    }

    /// Number of subscribers of one entry.
    pub fn subscriber_count(&self, dep: &DepRef) -> usize {
        self.sources
            .get(&dep.source)
            .and_then(|keys| keys.get(&dep.key))
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Number of sources with at least one entry.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl<S: Clone> Default for DepGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn extend<S: Clone>(collected: &mut Subscribers<S>, subscribers: &Subscribers<S>) {
    for (id, subscriber) in subscribers {
        collected.entry(*id).or_insert_with(|| subscriber.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Key;

    fn dep(source: SourceId, key: &str) -> DepRef {
        DepRef::new(source, Key::from(key))
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let id = SubscriberId::new();

        assert!(graph.subscribe(&dep(source, "a"), id, &"effect"));
        assert!(!graph.subscribe(&dep(source, "a"), id, &"effect"));
        assert_eq!(graph.subscriber_count(&dep(source, "a")), 1);
    }

    #[test]
    fn unsubscribe_prunes_empty_entries() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let id = SubscriberId::new();

        graph.subscribe(&dep(source, "a"), id, &1);
        assert_eq!(graph.source_count(), 1);

        assert_eq!(graph.unsubscribe(&dep(source, "a"), id), Some(1));
        assert!(graph.is_empty());
        assert_eq!(graph.unsubscribe(&dep(source, "a"), id), None);
    }

    #[test]
    fn pruning_one_source_keeps_the_others() {
        let mut graph = DepGraph::new();
        let sources: Vec<SourceId> = (0..4).map(|_| SourceId::new()).collect();
        let first = SubscriberId::new();
        let second = SubscriberId::new();

        for source in &sources {
            graph.subscribe(&dep(*source, "a"), first, &"first");
            graph.subscribe(&dep(*source, "a"), second, &"second");
        }
        graph.unsubscribe(&dep(sources[0], "a"), first);
        graph.unsubscribe(&dep(sources[0], "a"), second);

        assert_eq!(graph.source_count(), 3);
        let key = DepKey::Key(Key::from("a"));
        for source in &sources[1..] {
            let collected = graph.collect(*source, Some(&key), ChangeKind::Set, false);
            let order: Vec<_> = collected.keys().copied().collect();
            assert_eq!(order, vec![first, second]);
        }
    }

    #[test]
    fn set_collects_only_the_key() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let reader = SubscriberId::new();
        let iterator = SubscriberId::new();

        graph.subscribe(&dep(source, "a"), reader, &"reader");
        graph.subscribe(&DepRef::new(source, DepKey::Iterate), iterator, &"iterator");

        let key = DepKey::Key(Key::from("a"));
        let collected = graph.collect(source, Some(&key), ChangeKind::Set, false);
        assert_eq!(collected.len(), 1);
        assert!(collected.contains_key(&reader));

        let collected = graph.collect(source, Some(&key), ChangeKind::Set, true);
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn add_and_delete_collect_iteration() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let iterator = SubscriberId::new();

        graph.subscribe(&DepRef::new(source, DepKey::Iterate), iterator, &"iterator");

        let key = DepKey::Key(Key::from("new"));
        for kind in [ChangeKind::Add, ChangeKind::Delete] {
            let collected = graph.collect(source, Some(&key), kind, false);
            assert!(collected.contains_key(&iterator));
        }
    }

    #[test]
    fn collected_subscribers_are_deduplicated_in_order() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let first = SubscriberId::new();
        let second = SubscriberId::new();

        graph.subscribe(&dep(source, "a"), first, &"first");
        graph.subscribe(&dep(source, "a"), second, &"second");
        graph.subscribe(&DepRef::new(source, DepKey::Iterate), first, &"first");

        let key = DepKey::Key(Key::from("a"));
        let collected = graph.collect(source, Some(&key), ChangeKind::Add, false);
        let order: Vec<_> = collected.keys().copied().collect();
        assert_eq!(order, vec![first, second]);
    }

    #[test]
    fn clear_collects_everything() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();
        let other = SourceId::new();

        graph.subscribe(&dep(source, "a"), SubscriberId::new(), &1);
        graph.subscribe(&dep(source, "b"), SubscriberId::new(), &2);
        graph.subscribe(&dep(other, "a"), SubscriberId::new(), &3);

        let collected = graph.collect(source, None, ChangeKind::Clear, false);
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn remove_source_hands_back_entries() {
        let mut graph = DepGraph::new();
        let source = SourceId::new();

        graph.subscribe(&dep(source, "a"), SubscriberId::new(), &1);
        let removed = graph.remove_source(source).expect("source had entries");
        assert_eq!(removed.len(), 1);
        assert!(graph.is_empty());
    }
}
