//! Experiment A: information density
//!
//! NORMAL-style sentences are rewritten by an editor model into a more
//! detailed (Info+) and a sparser (Info−) variant. Predictors then judge both
//! variants; a bias toward HIGH on the detailed variant shows up as a positive
//! P(HIGH | Info+) − P(HIGH | Info−).
//!
//! Layout below the experiment directory:
//!
//! ```text
//! edited/GENERATOR/{id}.json
//! predictions/{info_plus|info_minus}/GENERATOR/PREDICTOR/{id}.json
//! ```

use super::ExperimentError;
use crate::analysis::{info_density_delta, write_csv, AnalysisError, BootstrapEstimator};
use crate::core::{ConditionKind, EditedPair, ModelId, PromptStyle, SourceSample};
use crate::executor::{Executor, PredictionTask, RunCounts};
use crate::store::{EditedPairStore, FsStore, KeyValueStore, ResultStore, Scope};
use std::path::Path;

pub const EDIT_STAGE: &str = "experiment_a/edit";
pub const PREDICT_STAGE: &str = "experiment_a/predict";
pub const DEFAULT_EDITOR: ModelId = ModelId::Nova2Lite;
pub const DELTA_FILE: &str = "experiment_a_p_high_delta.csv";

const VARIANTS: [ConditionKind; 2] = [ConditionKind::InfoPlus, ConditionKind::InfoMinus];

/// Edited-pair and prediction stores of one experiment directory
pub fn open_stores(dir: &Path) -> (EditedPairStore<FsStore>, ResultStore<FsStore>) {
    (
        EditedPairStore::open(dir.join("edited")),
        ResultStore::open(dir.join("predictions")),
    )
}

/// Samples eligible for editing
pub fn editable(samples: &[SourceSample]) -> Vec<SourceSample> {
    samples
        .iter()
        .filter(|s| s.prompt_style == PromptStyle::Normal)
        .cloned()
        .collect()
}

/// One task per pair, variant and predictor
///
/// Both variants are shown with the sample's real style and topic.
pub fn prediction_tasks(pairs: &[EditedPair], predictors: &[ModelId]) -> Vec<PredictionTask> {
    let mut tasks = Vec::with_capacity(pairs.len() * VARIANTS.len() * predictors.len());
    for pair in pairs {
        for kind in VARIANTS {
            let Some(text) = pair.variant_text(kind) else {
                continue;
            };
            for &predictor in predictors {
                tasks.push(PredictionTask::labelled(
                    pair.condition(kind, predictor),
                    text,
                    pair.prompt_type,
                ));
            }
        }
    }
    tasks
}

/// Generators a prediction run may cover
///
/// Stored pairs plus the NORMAL `samples` about to be edited, restricted to
/// the `generators` allow-list. These are the default predictors, so they
/// are checked for credentials before any call is made.
pub fn pair_generators<S: KeyValueStore>(
    pairs: &EditedPairStore<S>,
    samples: &[SourceSample],
    generators: Option<&[ModelId]>,
) -> Result<Vec<ModelId>, ExperimentError> {
    let (loaded, _) = pairs.load_all()?;
    let pending = samples
        .iter()
        .filter(|s| s.prompt_style == PromptStyle::Normal)
        .map(|s| s.generator);
    let mut models: Vec<ModelId> = loaded
        .iter()
        .map(|p| p.generator_model)
        .chain(pending)
        .filter(|m| generators.map_or(true, |allowed| allowed.contains(m)))
        .collect();
    models.sort_by_key(|m| m.name());
    models.dedup();
    Ok(models)
}

pub async fn edit<S: KeyValueStore>(
    executor: &Executor<'_>,
    store: &EditedPairStore<S>,
    editor: ModelId,
    samples: &[SourceSample],
) -> RunCounts {
    let eligible = editable(samples);
    tracing::info!(
        editor = editor.name(),
        eligible = eligible.len(),
        "Generating Info+/Info− pairs"
    );
    executor.edit(EDIT_STAGE, store, editor, &eligible).await
}

/// Predictions over every stored pair
///
/// An empty `predictors` list means the generators of the stored pairs.
pub async fn predict<E: KeyValueStore, S: KeyValueStore>(
    executor: &Executor<'_>,
    pairs: &EditedPairStore<E>,
    store: &ResultStore<S>,
    predictors: &[ModelId],
    generators: Option<&[ModelId]>,
) -> Result<RunCounts, ExperimentError> {
    let (mut loaded, corrupt) = pairs.load_all()?;
    if let Some(allowed) = generators {
        loaded.retain(|p| allowed.contains(&p.generator_model));
    }
    let predictors = if predictors.is_empty() {
        let mut generators: Vec<ModelId> = loaded.iter().map(|p| p.generator_model).collect();
        generators.sort_by_key(|m| m.name());
        generators.dedup();
        generators
    } else {
        predictors.to_vec()
    };
    tracing::info!(
        pairs = loaded.len(),
        corrupt = corrupt,
        predictors = ?predictors.iter().map(|m| m.name()).collect::<Vec<_>>(),
        "Running Info+/Info− predictions"
    );
    Ok(executor
        .predict(PREDICT_STAGE, store, prediction_tasks(&loaded, &predictors))
        .await)
}

pub fn analyze<S: KeyValueStore>(
    store: &ResultStore<S>,
    analysis_dir: &Path,
) -> Result<(), ExperimentError> {
    let loaded = store.load(Scope::All)?;
    let mut estimator = BootstrapEstimator::default();
    let rows = info_density_delta(&loaded.results, &mut estimator).map_err(AnalysisError::from)?;
    write_csv(&analysis_dir.join(DELTA_FILE), &rows)?;
    Ok(())
}
