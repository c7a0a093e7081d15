//! Result store for downstream experimental arms
//!
//! Layout: `condition_kind / GENERATOR / PREDICTOR / {source_id}.json`.

use super::{FsStore, KeyValueStore, StoreError, StoreKey};
use crate::core::{ConditionKind, ExperimentalCondition, ExperimentalResult, ModelId};
use std::path::PathBuf;

const RECORD_EXTENSION: &str = ".json";

/// Subset of a result store to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Kind(ConditionKind),
    Generator(ConditionKind, ModelId),
}

impl Scope {
    fn prefix(self) -> Result<StoreKey, StoreError> {
        match self {
            Scope::All => Ok(StoreKey::root()),
            Scope::Kind(kind) => StoreKey::new([kind.as_str()]),
            Scope::Generator(kind, generator) => StoreKey::new([kind.as_str(), generator.name()]),
        }
    }
}

/// Typed store of [`ExperimentalResult`]s over any backend
#[derive(Debug, Clone)]
pub struct ResultStore<S = FsStore> {
    backend: S,
}

impl ResultStore<FsStore> {
    /// Filesystem store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsStore::new(dir))
    }
}

impl<S: KeyValueStore> ResultStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Storage key for a condition
    ///
    /// Distinct (kind, generator, predictor, source id) tuples always map to
    /// distinct keys; ids that are not a single safe path segment are rejected.
    pub fn path_for(&self, condition: &ExperimentalCondition) -> Result<StoreKey, StoreError> {
        super::validate_segment(&condition.source_unique_id)?;
        StoreKey::new([
            condition.condition_type.as_str().to_string(),
            condition.generator_model_id.name().to_string(),
            condition.predictor_model_id.name().to_string(),
            format!("{}{}", condition.source_unique_id, RECORD_EXTENSION),
        ])
    }

    pub fn exists(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.backend.contains(key)
    }

    /// Persist a result under its condition's key
    ///
    /// Returns `false` without writing when the key exists and
    /// `skip_if_exists` is set. Otherwise the record is replaced wholesale.
    pub fn write(&self, result: &ExperimentalResult, skip_if_exists: bool) -> Result<bool, StoreError> {
        let key = self.path_for(&result.condition)?;
        if skip_if_exists && self.backend.contains(&key)? {
            return Ok(false);
        }
        let bytes =
            serde_json::to_vec_pretty(result).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend.put(&key, &bytes)?;
        Ok(true)
    }

    /// Lazily iterate every valid record below a scope
    ///
    /// Unreadable, unparseable or inconsistent records are logged and skipped;
    /// [`ResultIter::corrupt`] reports how many after iteration.
    pub fn read_all(&self, scope: Scope) -> Result<ResultIter<'_, S>, StoreError> {
        let keys = self
            .backend
            .keys(&scope.prefix()?)?
            .into_iter()
            .filter(|k| k.leaf().is_some_and(|leaf| leaf.ends_with(RECORD_EXTENSION)))
            .collect::<Vec<_>>();
        Ok(ResultIter {
            backend: &self.backend,
            keys: keys.into_iter(),
            corrupt: 0,
        })
    }

    /// Collect every valid record below a scope
    pub fn load(&self, scope: Scope) -> Result<ResultSet, StoreError> {
        let mut iter = self.read_all(scope)?;
        let results = iter.by_ref().collect();
        Ok(ResultSet {
            results,
            corrupt: iter.corrupt(),
        })
    }
}

/// Records loaded from a scope plus the number skipped as corrupt
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub results: Vec<ExperimentalResult>,
    pub corrupt: usize,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results of one condition kind
    pub fn of_kind(&self, kind: ConditionKind) -> impl Iterator<Item = &ExperimentalResult> {
        self.results
            .iter()
            .filter(move |r| r.condition.condition_type == kind)
    }
}

/// Lazy iterator over stored results
pub struct ResultIter<'a, S> {
    backend: &'a S,
    keys: std::vec::IntoIter<StoreKey>,
    corrupt: usize,
}

impl<S> ResultIter<'_, S> {
    /// Records skipped so far
    pub fn corrupt(&self) -> usize {
        self.corrupt
    }
}

fn decode_result<S: KeyValueStore>(backend: &S, key: &StoreKey) -> Result<ExperimentalResult, String> {
    let result: ExperimentalResult = super::read_record(backend, key)?;
    if !result.is_consistent() {
        return Err("is_correct disagrees with predicted and expected labels".to_string());
    }
    Ok(result)
}

impl<S: KeyValueStore> Iterator for ResultIter<'_, S> {
    type Item = ExperimentalResult;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            match decode_result(self.backend, &key) {
                Ok(result) => return Some(result),
                Err(reason) => {
                    self.corrupt += 1;
                    tracing::warn!(key = %key, reason = %reason, "Skipping corrupt result record");
                }
            }
        }
        None
    }
}
