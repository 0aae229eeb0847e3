// ── Keyed reactive collection ──
//
// Values keyed by cloud id. Readers get `Arc` snapshots in discovery
// order and can subscribe to changes through `watch`.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use indexmap::IndexSet;
use tokio::sync::watch;

/// Concurrent map that remembers first-insertion order.
///
/// `DashMap` holds the entities; a separate `IndexSet` records the order
/// keys were first inserted so snapshots list devices the way the cloud
/// discovered them. Every mutation bumps a version counter and rebuilds
/// the snapshot that subscribers receive.
pub(crate) struct KeyedCollection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Insertion order of keys.
    order: Mutex<IndexSet<String>>,

    /// Bumped after every mutation.
    version: watch::Sender<u64>,

    /// Ordered values as of the last mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> KeyedCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            order: Mutex::new(IndexSet::new()),
            version,
            snapshot,
        }
    }

    /// Insert or replace. `true` when the key was not present before.
    pub(crate) fn upsert(&self, key: &str, entity: T) -> bool {
        let is_new = self
            .order
            .lock()
            .expect("collection order lock poisoned")
            .insert(key.to_owned());
        self.by_key.insert(key.to_owned(), Arc::new(entity));
        self.publish();
        is_new
    }

    /// Read-modify-write one entity in place.
    ///
    /// Returns the updated entity, or `None` if the key is absent. The
    /// closure runs under the shard lock, so it must not touch the
    /// collection again.
    pub(crate) fn update<F>(&self, key: &str, f: F) -> Option<Arc<T>>
    where
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut entry = self.by_key.get_mut(key)?;
            let mut next = T::clone(entry.value());
            f(&mut next);
            let next = Arc::new(next);
            *entry.value_mut() = Arc::clone(&next);
            next
        };
        self.publish();
        Some(updated)
    }

    /// Drop `key`, returning the last value.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.order
                .lock()
                .expect("collection order lock poisoned")
                .shift_remove(key);
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Ordered values; an `Arc` clone.
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// Current version; increases on every mutation.
    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// All keys in insertion order.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.order
            .lock()
            .expect("collection order lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild the ordered snapshot, then bump the version.
    fn publish(&self) {
        let ordered: Vec<Arc<T>> = self
            .keys()
            .iter()
            .filter_map(|k| self.get(k))
            .collect();
        // send_modify stores the value even with no receivers
        self.snapshot.send_modify(|snap| *snap = Arc::new(ordered));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        assert!(col.upsert("key1", "hello".into()));
        assert!(!col.upsert("key1", "world".into()));
        assert_eq!(*col.get("key1").unwrap(), "world");
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        for key in ["z", "a", "m"] {
            col.upsert(key, key.to_uppercase());
        }
        col.upsert("a", "A2".into());

        let snap: Vec<String> = col.snapshot().iter().map(|s| (**s).clone()).collect();
        assert_eq!(snap, ["Z", "A2", "M"]);
        assert_eq!(col.keys(), ["z", "a", "m"]);
    }

    #[test]
    fn remove_cleans_up_order() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        col.upsert("a", "x".into());
        col.upsert("b", "y".into());

        assert_eq!(*col.remove("a").unwrap(), "x");
        assert!(col.remove("a").is_none());
        assert_eq!(col.keys(), ["b"]);
        assert_eq!(col.len(), 1);

        col.remove("b");
        assert!(col.is_empty());
        assert!(col.snapshot().is_empty());
    }

    #[test]
    fn update_rewrites_in_place() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        col.upsert("a", "x".into());
        let before = col.version();

        let updated = col.update("a", |s| s.push('!')).unwrap();
        assert_eq!(*updated, "x!");
        assert!(col.version() > before);
        assert!(col.update("missing", |s| s.clear()).is_none());
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let col: KeyedCollection<String> = KeyedCollection::new();
        let mut rx = col.subscribe();
        col.upsert("a", "x".into());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
