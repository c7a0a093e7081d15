//! Experiment D: how much do predictors lean on the style label?
//!
//! - `blind`: the sentence alone, style and topic withheld
//! - `wrong_label`: FACTUAL and ABSURD swapped in the prompt; the stored
//!   condition keeps the sample's real style so the shift can be measured
//!   per original style
//!
//! The analysis compares both arms against Study 2 within-model results.

use super::ExperimentError;
use crate::analysis::{
    label_condition_metrics, write_csv, wrong_label_shift, AnalysisError, BootstrapEstimator,
};
use crate::core::{ConditionKind, ModelId, SourceSample};
use crate::executor::{Executor, PredictionTask, RunCounts};
use crate::store::{KeyValueStore, ResultStore, Scope};
use std::path::Path;

pub const STAGE: &str = "experiment_d";
pub const ACCURACY_FILE: &str = "experiment_d_accuracy_by_label_condition.csv";
pub const SHIFT_FILE: &str = "experiment_d_wrong_label_shift.csv";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperimentDCounts {
    pub blind: RunCounts,
    pub wrong_label: RunCounts,
}

pub fn blind_tasks(samples: &[SourceSample], predictors: &[ModelId]) -> Vec<PredictionTask> {
    samples
        .iter()
        .flat_map(|s| {
            predictors.iter().map(move |&p| {
                PredictionTask::blind(s.condition(ConditionKind::Blind, p), s.text.clone())
            })
        })
        .collect()
}

/// Wrong-label tasks; NORMAL samples have no swapped style and are left out
pub fn wrong_label_tasks(samples: &[SourceSample], predictors: &[ModelId]) -> Vec<PredictionTask> {
    samples
        .iter()
        .filter_map(|s| s.prompt_style.swapped().map(|shown| (s, shown)))
        .flat_map(|(s, shown)| {
            predictors.iter().map(move |&p| {
                PredictionTask::labelled(s.condition(ConditionKind::WrongLabel, p), s.text.clone(), shown)
            })
        })
        .collect()
}

pub async fn run<S: KeyValueStore>(
    executor: &Executor<'_>,
    store: &ResultStore<S>,
    samples: &[SourceSample],
    predictors: &[ModelId],
) -> ExperimentDCounts {
    let blind = executor
        .predict("experiment_d/blind", store, blind_tasks(samples, predictors))
        .await;
    tracing::info!(counts = %blind, "blind finished");

    let wrong_label = executor
        .predict(
            "experiment_d/wrong_label",
            store,
            wrong_label_tasks(samples, predictors),
        )
        .await;
    tracing::info!(counts = %wrong_label, "wrong_label finished");

    ExperimentDCounts { blind, wrong_label }
}

/// Label-condition metrics and the wrong-label shift table
///
/// `full` is the Study 2 store; only its within-model results are used.
pub fn analyze<F: KeyValueStore, S: KeyValueStore>(
    full: &ResultStore<F>,
    ablation: &ResultStore<S>,
    analysis_dir: &Path,
) -> Result<(), ExperimentError> {
    let full = full.load(Scope::Kind(ConditionKind::WithinModel))?;
    let ablation = ablation.load(Scope::All)?;
    tracing::info!(
        full = full.len(),
        ablation = ablation.len(),
        corrupt = full.corrupt + ablation.corrupt,
        "Loaded label-ablation results"
    );

    let metrics = label_condition_metrics(&full.results, &ablation.results);
    write_csv(&analysis_dir.join(ACCURACY_FILE), &metrics)?;

    let mut estimator = BootstrapEstimator::default();
    let shift = wrong_label_shift(&full.results, &ablation.results, &mut estimator)
        .map_err(AnalysisError::from)?;
    write_csv(&analysis_dir.join(SHIFT_FILE), &shift)?;
    Ok(())
}
