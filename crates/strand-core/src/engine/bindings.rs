//! Fiber context objects
//!
//! Every fiber carries a small property bag that scripts can read and write
//! (`fiber.requestId = ...`). When a fiber starts another one, the callee
//! receives a one-time copy of the caller's enumerable bindings.

use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    enumerable: bool,
}

/// Insertion-ordered property bag owned by a fiber
#[derive(Debug, Default)]
pub struct Bindings {
    entries: Mutex<IndexMap<String, Binding>>,
}

impl Bindings {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a binding's value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).map(|b| b.value.clone())
    }

    /// Set an enumerable binding, replacing any previous one
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), true);
    }

    /// Set an engine-internal binding
    ///
    /// Hidden bindings are readable through [`get`](Self::get) but are not
    /// enumerated and therefore never inherited by callees.
    pub fn set_hidden(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.insert(key.into(), value.into(), false);
    }

    fn insert(&self, key: String, value: Value, enumerable: bool) {
        self.entries
            .lock()
            .insert(key, Binding { value, enumerable });
    }

    /// Remove a binding, returning its value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.lock().shift_remove(key).map(|b| b.value)
    }

    /// Check whether a binding exists (hidden or not)
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Enumerable bindings in insertion order
    pub fn own_entries(&self) -> Vec<(String, Value)> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, b)| b.enumerable)
            .map(|(k, b)| (k.clone(), b.value.clone()))
            .collect()
    }

    /// Names of the enumerable bindings in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.own_entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Number of enumerable bindings
    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|b| b.enumerable).count()
    }

    /// Whether there are no enumerable bindings
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every enumerable binding of `source` into `self`
    ///
    /// Existing keys are overwritten. The copy is a snapshot: the two bags
    /// share nothing afterwards. Returns the number of bindings copied.
    pub fn copy_from(&self, source: &Bindings) -> usize {
        if std::ptr::eq(self, source) {
            return 0;
        }
        // Snapshot first so the two locks are never held together.
        let snapshot = source.own_entries();
        let count = snapshot.len();
        let mut entries = self.entries.lock();
        for (key, value) in snapshot {
            entries.insert(
                key,
                Binding {
                    value,
                    enumerable: true,
                },
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let b = Bindings::new();
        b.set("a", 1);
        b.set("b", "two");
        assert_eq!(b.get("a"), Some(Value::int(1)));
        assert_eq!(b.get("b"), Some(Value::str("two")));
        assert_eq!(b.remove("a"), Some(Value::int(1)));
        assert!(!b.contains("a"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_insertion_order() {
        let b = Bindings::new();
        b.set("z", 1);
        b.set("a", 2);
        b.set("m", 3);
        assert_eq!(b.keys(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_copy_is_snapshot() {
        let caller = Bindings::new();
        caller.set("a", 1);
        caller.set("b", 2);

        let callee = Bindings::new();
        assert_eq!(callee.copy_from(&caller), 2);

        caller.set("a", 100);
        callee.set("b", 200);

        assert_eq!(callee.get("a"), Some(Value::int(1)));
        assert_eq!(caller.get("b"), Some(Value::int(2)));
    }

    #[test]
    fn test_hidden_bindings_not_copied() {
        let caller = Bindings::new();
        caller.set("visible", true);
        caller.set_hidden("__internal", 7);
        assert_eq!(caller.get("__internal"), Some(Value::int(7)));
        assert_eq!(caller.len(), 1);

        let callee = Bindings::new();
        callee.copy_from(&caller);
        assert!(callee.contains("visible"));
        assert!(!callee.contains("__internal"));
    }

    #[test]
    fn test_copy_from_self_is_noop() {
        let b = Bindings::new();
        b.set("k", 1);
        assert_eq!(b.copy_from(&b), 0);
        assert_eq!(b.len(), 1);
    }
}
