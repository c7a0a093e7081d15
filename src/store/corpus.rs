//! Stage-1 generation corpus
//!
//! Layout: `MODEL / TOPIC / STYLE / temp_{t}_loop_{i}.json`. The corpus is the
//! source of every [`SourceSample`] the downstream arms predict on.

use super::{FsStore, KeyValueStore, StoreError, StoreKey};
use crate::core::{
    format_temperature, GenerationRecord, ModelId, PromptStyle, SourceSample, Thresholds, Topic,
};
use std::path::PathBuf;

/// Typed store of stage-1 [`GenerationRecord`]s
#[derive(Debug, Clone)]
pub struct Study1Corpus<S = FsStore> {
    backend: S,
}

impl Study1Corpus<FsStore> {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FsStore::new(dir))
    }
}

/// Candidates accepted from the corpus plus the reasons others were dropped
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub samples: Vec<SourceSample>,
    /// Unreadable or unparseable records
    pub corrupt: usize,
    /// Temperature inside the indeterminate band
    pub out_of_band: usize,
    /// Generator outside the allow-list
    pub filtered: usize,
}

impl CandidateSet {
    /// Keep only the first `limit` samples
    pub fn truncate(&mut self, limit: Option<usize>) {
        if let Some(limit) = limit {
            self.samples.truncate(limit);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn is_generation_file(key: &StoreKey) -> bool {
    key.segments().len() == 4
        && key
            .leaf()
            .is_some_and(|leaf| leaf.starts_with("temp_") && leaf.ends_with(".json"))
}

impl<S: KeyValueStore> Study1Corpus<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Key of one generation
    pub fn key_for(
        &self,
        model: ModelId,
        topic: Topic,
        style: PromptStyle,
        temperature: f64,
        loop_index: u32,
    ) -> Result<StoreKey, StoreError> {
        StoreKey::new([
            model.name().to_string(),
            topic.name().to_string(),
            style.name().to_string(),
            format!("temp_{}_loop_{}.json", format_temperature(temperature), loop_index),
        ])
    }

    pub fn record_key(&self, record: &GenerationRecord) -> Result<StoreKey, StoreError> {
        let c = &record.condition;
        self.key_for(c.model_id, c.target, c.prompt_type, c.temperature, record.loop_times)
    }

    pub fn exists(&self, key: &StoreKey) -> Result<bool, StoreError> {
        self.backend.contains(key)
    }

    /// Persist a generation; `false` when skipped because it already exists
    pub fn write(&self, record: &GenerationRecord, skip_if_exists: bool) -> Result<bool, StoreError> {
        let key = self.record_key(record)?;
        if skip_if_exists && self.backend.contains(&key)? {
            return Ok(false);
        }
        let bytes =
            serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend.put(&key, &bytes)?;
        Ok(true)
    }

    /// Every stored generation in key order, skipping corrupt records
    pub fn records(&self) -> Result<(Vec<GenerationRecord>, usize), StoreError> {
        let mut records = Vec::new();
        let mut corrupt = 0;
        for key in self.backend.keys(&StoreKey::root())? {
            if !is_generation_file(&key) {
                continue;
            }
            match super::read_record::<_, GenerationRecord>(&self.backend, &key) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    corrupt += 1;
                    tracing::warn!(key = %key, reason = %reason, "Skipping unreadable stage-1 record");
                }
            }
        }
        Ok((records, corrupt))
    }

    /// Load labelled candidates for downstream arms
    ///
    /// Samples in the indeterminate band and samples from generators outside
    /// `generators` (when given) are dropped.
    pub fn load_candidates(
        &self,
        thresholds: &Thresholds,
        generators: Option<&[ModelId]>,
    ) -> Result<CandidateSet, StoreError> {
        let (records, corrupt) = self.records()?;
        let mut set = CandidateSet {
            corrupt,
            ..CandidateSet::default()
        };

        for record in records {
            let condition = &record.condition;
            if let Some(allowed) = generators {
                if !allowed.contains(&condition.model_id) {
                    set.filtered += 1;
                    continue;
                }
            }
            let Some(expected) = thresholds.label(condition.temperature) else {
                set.out_of_band += 1;
                continue;
            };
            set.samples.push(SourceSample {
                source_id: record.source_id(),
                generator: condition.model_id,
                prompt_style: condition.prompt_type,
                topic: condition.target,
                temperature: condition.temperature,
                loop_index: record.loop_times,
                text: record.response.generated_sentence.clone(),
                source_reasoning: record.response.reasoning.clone(),
                source_label: record.response.judgment,
                expected,
            });
        }

        tracing::info!(
            candidates = set.samples.len(),
            out_of_band = set.out_of_band,
            filtered = set.filtered,
            corrupt = set.corrupt,
            "Loaded stage-1 candidates"
        );
        Ok(set)
    }
}
