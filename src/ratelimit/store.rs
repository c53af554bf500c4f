//! Per-client state storage with atomic read-modify-write.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A concurrency-safe mapping from client key to algorithm state.
///
/// The map is sharded, so hits for unrelated keys contend only when they
/// land on the same shard. Every update for a given key runs while that
/// key's shard is write-locked, which makes [`compute`](Self::compute)
/// indivisible per key.
///
/// State is created lazily on the first hit and only destroyed by
/// [`reset`](Self::reset).
#[derive(Debug)]
pub struct KeyedStateStore<T> {
    entries: DashMap<String, T>,
}

impl<T: Default> KeyedStateStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Atomically replace the state for `key`.
    ///
    /// `f` receives the previous state (`None` if the key has never been
    /// seen since the last reset) and returns the state to store together
    /// with an outcome that is handed back to the caller.
    pub fn compute<R, F>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(Option<T>) -> (T, R),
    {
        if let Some(mut slot) = self.entries.get_mut(key) {
            let previous = std::mem::take(slot.value_mut());
            let (next, outcome) = f(Some(previous));
            *slot.value_mut() = next;
            return outcome;
        }

        // Another caller may have inserted the key between the lookup above
        // and taking the entry lock here, so both arms must be handled.
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let previous = std::mem::take(occupied.get_mut());
                let (next, outcome) = f(Some(previous));
                *occupied.get_mut() = next;
                outcome
            }
            Entry::Vacant(vacant) => {
                let (next, outcome) = f(None);
                vacant.insert(next);
                outcome
            }
        }
    }

    /// Remove every key.
    pub fn reset(&self) {
        self.entries.clear();
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Default + Clone> KeyedStateStore<T> {
    /// Compute-and-replace returning a copy of the new state.
    pub fn update<F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce(Option<T>) -> T,
    {
        self.compute(key, |previous| {
            let next = f(previous);
            (next.clone(), next)
        })
    }

    /// Snapshot of the state stored for `key`, if any.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }
}

impl<T: Default> Default for KeyedStateStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_state_created_lazily() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("a"), None);

        let seen = store.compute("a", |previous| (1, previous));
        assert_eq!(seen, None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a"), Some(1));
    }

    #[test]
    fn test_compute_sees_previous_state() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();

        store.update("a", |previous| previous.unwrap_or(0) + 1);
        let next = store.update("a", |previous| previous.unwrap_or(0) + 1);

        assert_eq!(next, 2);
        assert_eq!(store.get("a"), Some(2));
    }

    #[test]
    fn test_keys_are_independent() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();

        store.update("a", |_| 5);
        store.update("b", |_| 3);

        assert_eq!(store.get("a"), Some(5));
        assert_eq!(store.get("b"), Some(3));
    }

    #[test]
    fn test_reset_clears_all_keys() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();
        store.update("a", |_| 1);
        store.update("b", |_| 1);

        store.reset();

        assert!(store.is_empty());
        let seen = store.compute("a", |previous| (1, previous));
        assert_eq!(seen, None);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store: Arc<KeyedStateStore<u64>> = Arc::new(KeyedStateStore::new());

        thread::scope(|scope| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..1000 {
                        store.update("shared", |previous| previous.unwrap_or(0) + 1);
                    }
                });
            }
        });

        assert_eq!(store.get("shared"), Some(8000));
    }

    #[test]
    fn test_concurrent_first_hits_create_once() {
        let store: KeyedStateStore<u64> = KeyedStateStore::new();

        let created: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        store.compute("fresh", |previous| match previous {
                            None => (1, 1usize),
                            Some(count) => (count + 1, 0usize),
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(created, 1);
        assert_eq!(store.get("fresh"), Some(8));
    }
}
