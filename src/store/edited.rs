//! Info+/Info− rewrites
//!
//! Layout: `GENERATOR / {source_id}.json`.

use super::{FsStore, KeyValueStore, StoreError, StoreKey};
use crate::core::{EditedPair, ModelId};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EditedPairStore<S = FsStore> {
    backend: S,
}

impl EditedPairStore<FsStore> {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsStore::new(dir))
    }
}

impl<S: KeyValueStore> EditedPairStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn path_for(&self, generator: ModelId, source_id: &str) -> Result<StoreKey, StoreError> {
        super::validate_segment(source_id)?;
        StoreKey::new([generator.name().to_string(), format!("{}.json", source_id)])
    }

    pub fn exists(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.backend.contains(key)
    }

    pub fn write(&self, pair: &EditedPair, skip_if_exists: bool) -> Result<bool, StoreError> {
        let key = self.path_for(pair.generator_model, &pair.source_unique_id)?;
        if skip_if_exists && self.backend.contains(&key)? {
            return Ok(false);
        }
        let bytes =
            serde_json::to_vec_pretty(pair).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend.put(&key, &bytes)?;
        Ok(true)
    }

    /// Every stored pair in key order, plus the number of corrupt records skipped
    pub fn load_all(&self) -> Result<(Vec<EditedPair>, usize), StoreError> {
        let mut pairs = Vec::new();
        let mut corrupt = 0;
        for key in self.backend.keys(&StoreKey::root())? {
            if !key.leaf().is_some_and(|leaf| leaf.ends_with(".json")) {
                continue;
            }
            match super::read_record::<_, EditedPair>(&self.backend, &key) {
                Ok(pair) => pairs.push(pair),
                Err(reason) => {
                    corrupt += 1;
                    tracing::warn!(key = %key, reason = %reason, "Skipping unreadable edited pair");
                }
            }
        }
        Ok((pairs, corrupt))
    }
}
