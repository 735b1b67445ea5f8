use std::collections::HashMap;

use parking_lot::RwLock;

use super::{PersistedStore, StoreChange, StoreError};

/// In-memory store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl PersistedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn apply(&self, changes: &[StoreChange<'_>]) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    entries.insert((*key).to_string(), (*value).to_string());
                }
                None => {
                    entries.remove(*key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_writes_and_clears() {
        let store = MemoryStore::with_entries([("stale", "1")]);
        store
            .apply(&[("a", Some("x")), ("b", Some("y")), ("stale", None)])
            .unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("x"));
        assert_eq!(store.get("stale").unwrap(), None);
        assert_eq!(store.len(), 2);

        store.clear(&["a", "b", "missing"]).unwrap();
        assert!(store.is_empty());
    }
}
