//! In-memory backend for tests and dry runs

use super::{KeyValueStore, StoreError, StoreKey};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// [`KeyValueStore`] over a sorted map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn contains(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.contains_key(key))
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        if key.is_root() {
            return Err(StoreError::EmptyKey);
        }
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn keys(&self, scope: &StoreKey) -> Result<Vec<StoreKey>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .range(scope.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(scope))
            .cloned()
            .collect())
    }
}

/// Memory backend whose reads fail for keys with a given leaf
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct UnreadableLeaf {
    pub inner: MemoryStore,
    pub leaf: String,
}

#[cfg(test)]
impl KeyValueStore for UnreadableLeaf {
    fn contains(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.inner.contains(key)
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        if key.leaf() == Some(self.leaf.as_str()) {
            return Err(StoreError::Io {
                path: std::path::PathBuf::from(key.to_string()),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        self.inner.get(key)
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, value)
    }

    fn keys(&self, scope: &StoreKey) -> Result<Vec<StoreKey>, StoreError> {
        self.inner.keys(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_keys() {
        let store = MemoryStore::new();
        let a = StoreKey::new(["blind", "X", "1.json"]).unwrap();
        let b = StoreKey::new(["blinder", "X", "1.json"]).unwrap();
        let c = StoreKey::new(["blind", "A", "2.json"]).unwrap();
        for k in [&a, &b, &c] {
            store.put(k, b"v").unwrap();
        }
        let keys = store.keys(&StoreKey::new(["blind"]).unwrap()).unwrap();
        assert_eq!(keys, vec![c, a]);
        assert_eq!(store.keys(&StoreKey::root()).unwrap().len(), 3);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let store = MemoryStore::new();
        let k = StoreKey::new(["k.json"]).unwrap();
        store.put(&k, b"old").unwrap();
        store.put(&k, b"new").unwrap();
        assert_eq!(store.get(&k).unwrap().unwrap(), b"new");
        assert_eq!(store.len(), 1);
    }
}
