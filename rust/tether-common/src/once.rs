use std::{hash::Hash, sync::Arc};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// A create-once cache keyed by `K`.
///
/// The first caller for a key runs the initializer; every later caller
/// receives a clone of the value the first caller produced. Entries are never
/// replaced. Keys iterate in first-seen order.
///
/// The cache is an ordinary value that is handed down to whoever needs it, so
/// two pipelines that share a [OnceMap] share its entries and two that don't,
/// don't.
///
/// The initializer runs while the cache is locked and must not reach back
/// into the same [OnceMap].
#[derive(Debug)]
pub struct OnceMap<K, V> {
    entries: Arc<Mutex<IndexMap<K, V>>>,
}

impl<K, V> Clone for OnceMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(IndexMap::new())),
        }
    }
}

impl<K, V> OnceMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Return the value for `key`, creating it with `init` if this is the
    /// first time the key is seen.
    pub fn get_or_init<F>(&self, key: K, init: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&key) {
            return value.clone();
        }
        let value = init(&key);
        entries.insert(key, value.clone());
        value
    }

    /// Like [OnceMap::get_or_init] with a fallible initializer. A failed
    /// initialization leaves no entry behind.
    pub fn try_get_or_init<F, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&key) {
            return Ok(value.clone());
        }
        let value = init(&key)?;
        entries.insert(key, value.clone());
        Ok(value)
    }

    /// The value for `key`, if one was created.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Keys in the order they were first initialized.
    pub fn keys(&self) -> Vec<K> {
        self.entries.lock().keys().cloned().collect()
    }

    /// The number of initialized entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been initialized yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::OnceMap;

    #[test]
    fn it_initializes_each_key_once() {
        let cache = OnceMap::<String, usize>::default();
        let mut calls = 0;

        for scope in ["111", "222", "111", "111"] {
            cache.get_or_init(scope.to_string(), |_| {
                calls += 1;
                calls
            });
        }

        assert_eq!(calls, 2);
        assert_eq!(cache.get(&"111".to_string()), Some(1));
        assert_eq!(cache.keys(), vec!["111".to_string(), "222".to_string()]);
    }

    #[test]
    fn it_shares_entries_between_clones() {
        let cache = OnceMap::<u8, &'static str>::default();
        let other = cache.clone();

        cache.get_or_init(1, |_| "first");
        let value = other.get_or_init(1, |_| "second");

        assert_eq!(value, "first");
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn it_forgets_failed_initializations() {
        let cache = OnceMap::<u8, u8>::default();

        let failed: Result<u8, &str> = cache.try_get_or_init(1, |_| Err("unreachable"));
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let value: Result<u8, &str> = cache.try_get_or_init(1, |_| Ok(9));
        assert_eq!(value, Ok(9));
    }
}
