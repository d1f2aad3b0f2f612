//! # Subscription Registry
//!
//! The single source of truth for what a channel *should* be subscribed to,
//! whether or not a connection currently exists. The supervisor reads a
//! snapshot every time it dials, so anything added while disconnected is
//! picked up by the next reconnect.
//!
//! The registry never performs I/O. Callers that mutate it decide whether a
//! protocol frame has to follow.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier sets keyed by stream kind (e.g. `assets_ids`, `markets`).
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `ids` to `kind`. Returns the ids that were not present before.
    pub fn add<I, S>(&self, kind: &str, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut subs = self.lock();
        let set = subs.entry(kind.to_string()).or_default();

        let mut added = Vec::new();
        for id in ids {
            let id = id.into();
            if set.insert(id.clone()) {
                added.push(id);
            }
        }
        added
    }

    /// Removes `ids` from `kind`. Returns the ids that were actually present.
    pub fn remove<I, S>(&self, kind: &str, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut subs = self.lock();
        let Some(set) = subs.get_mut(kind) else {
            return Vec::new();
        };

        let removed: Vec<String> = ids
            .into_iter()
            .filter_map(|id| set.take(id.as_ref()))
            .collect();

        if set.is_empty() {
            subs.remove(kind);
        }
        removed
    }

    /// Replaces the whole set for `kind`.
    pub fn replace<I, S>(&self, kind: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = ids.into_iter().map(Into::into).collect();
        let mut subs = self.lock();
        if set.is_empty() {
            subs.remove(kind);
        } else {
            subs.insert(kind.to_string(), set);
        }
    }

    /// A sorted copy of the ids for `kind`.
    ///
    /// Sorting keeps snapshot frames deterministic; the set itself is unordered.
    pub fn snapshot(&self, kind: &str) -> Vec<String> {
        let subs = self.lock();
        let mut ids: Vec<String> = subs
            .get(kind)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// A copy of every kind and its ids.
    pub fn snapshot_all(&self) -> HashMap<String, Vec<String>> {
        let kinds: Vec<String> = self.lock().keys().cloned().collect();
        kinds
            .into_iter()
            .map(|kind| {
                let ids = self.snapshot(&kind);
                (kind, ids)
            })
            .collect()
    }

    pub fn contains(&self, kind: &str, id: &str) -> bool {
        self.lock().get(kind).is_some_and(|set| set.contains(id))
    }

    pub fn len(&self, kind: &str) -> usize {
        self.lock().get(kind).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self, kind: &str) -> bool {
        self.len(kind) == 0
    }

    // A panic while holding the guard cannot leave a HashSet half-updated, so
    // a poisoned lock is still safe to reuse.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashSet<String>>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.snapshot_all())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSETS: &str = "assets_ids";

    #[test]
    fn test_add_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.add(ASSETS, ["a", "b"]), vec!["a", "b"]);
        assert_eq!(registry.add(ASSETS, ["b", "c"]), vec!["c"]);
        assert_eq!(registry.snapshot(ASSETS), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.add(ASSETS, ["a"]);
        assert!(registry.remove(ASSETS, ["zzz"]).is_empty());
        assert!(registry.remove("markets", ["a"]).is_empty());
        assert_eq!(registry.snapshot(ASSETS), vec!["a"]);
    }

    #[test]
    fn test_remove_last_id_drops_kind() {
        let registry = SubscriptionRegistry::new();
        registry.add(ASSETS, ["a"]);
        assert_eq!(registry.remove(ASSETS, ["a"]), vec!["a"]);
        assert!(registry.is_empty(ASSETS));
        assert!(registry.snapshot_all().is_empty());
    }

    #[test]
    fn test_replace_overwrites_set() {
        let registry = SubscriptionRegistry::new();
        registry.add(ASSETS, ["a", "b"]);
        registry.replace(ASSETS, ["x"]);
        assert_eq!(registry.snapshot(ASSETS), vec!["x"]);
        registry.replace(ASSETS, Vec::<String>::new());
        assert!(registry.is_empty(ASSETS));
    }

    #[test]
    fn test_kinds_are_independent() {
        let registry = SubscriptionRegistry::new();
        registry.add(ASSETS, ["a"]);
        registry.add("markets", ["m"]);
        assert!(registry.contains(ASSETS, "a"));
        assert!(!registry.contains(ASSETS, "m"));
        assert_eq!(registry.snapshot_all().len(), 2);
    }

    #[test]
    fn test_union_of_successive_adds() {
        let registry = SubscriptionRegistry::new();
        registry.add(ASSETS, ["1", "2"]);
        registry.add(ASSETS, ["2", "3", "4"]);
        assert_eq!(registry.snapshot(ASSETS), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_clones_share_state_across_threads() {
        let registry = SubscriptionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = registry.clone();
                std::thread::spawn(move || {
                    r.add(ASSETS, [format!("id-{}", i)]);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(ASSETS), 8);
    }
}
