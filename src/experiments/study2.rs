//! Study 2: can a model tell the temperature behind a sentence?
//!
//! Three arms per candidate sample:
//!
//! - `self_reflection`: the generator's own stage-1 judgment, reused as is
//! - `within_model`: the generator judges its sentence again, as a predictor
//! - `across_model`: every other predictor judges the sentence

use super::ExperimentError;
use crate::analysis::{
    condition_metrics, self_vs_within, write_csv, BootstrapEstimator, SelfWithinRow, SummaryRow,
    STUDY2_KINDS,
};
use crate::core::{ConditionKind, ExperimentalResult, ModelId, SourceSample};
use crate::executor::{Executor, PredictionTask, RunCounts};
use crate::store::{KeyValueStore, ResultStore, Scope};
use std::path::Path;

pub const STAGE: &str = "study2";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const DETAILED_METRICS_FILE: &str = "study2_detailed_metrics.csv";
pub const BOOTSTRAP_FILE: &str = "study2_bootstrap_ci.csv";

/// Counts per arm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Study2Counts {
    pub self_reflection: RunCounts,
    pub within_model: RunCounts,
    pub across_model: RunCounts,
}

impl Study2Counts {
    pub fn total(&self) -> RunCounts {
        let mut total = self.self_reflection;
        total.merge(self.within_model);
        total.merge(self.across_model);
        total
    }
}

/// Self-reflection results, built from the stage-1 judgments
pub fn self_reflection_results(samples: &[SourceSample]) -> Vec<ExperimentalResult> {
    samples
        .iter()
        .map(|s| {
            ExperimentalResult::new(
                s.condition(ConditionKind::SelfReflection, s.generator),
                s.text.clone(),
                s.source_reasoning.clone(),
                s.source_label,
                0,
            )
        })
        .collect()
}

pub fn within_model_tasks(samples: &[SourceSample]) -> Vec<PredictionTask> {
    samples
        .iter()
        .map(|s| {
            PredictionTask::labelled(
                s.condition(ConditionKind::WithinModel, s.generator),
                s.text.clone(),
                s.prompt_style,
            )
        })
        .collect()
}

/// One task per sample and predictor other than the sample's generator
pub fn across_model_tasks(samples: &[SourceSample], predictors: &[ModelId]) -> Vec<PredictionTask> {
    samples
        .iter()
        .flat_map(|s| {
            predictors
                .iter()
                .filter(move |&&p| p != s.generator)
                .map(move |&p| {
                    PredictionTask::labelled(
                        s.condition(ConditionKind::AcrossModel, p),
                        s.text.clone(),
                        s.prompt_style,
                    )
                })
        })
        .collect()
}

pub async fn run<S: KeyValueStore>(
    executor: &Executor<'_>,
    store: &ResultStore<S>,
    samples: &[SourceSample],
    predictors: &[ModelId],
) -> Study2Counts {
    let self_reflection =
        executor.store_results("study2/self_reflection", store, self_reflection_results(samples));
    tracing::info!(counts = %self_reflection, "self_reflection finished");

    let within_model = executor
        .predict("study2/within_model", store, within_model_tasks(samples))
        .await;
    tracing::info!(counts = %within_model, "within_model finished");

    let across_model = executor
        .predict(
            "study2/across_model",
            store,
            across_model_tasks(samples, predictors),
        )
        .await;
    tracing::info!(counts = %across_model, "across_model finished");

    Study2Counts {
        self_reflection,
        within_model,
        across_model,
    }
}

/// Accuracy per (predictor, condition) over everything in the store
pub fn summary<S: KeyValueStore>(store: &ResultStore<S>) -> Result<Vec<SummaryRow>, ExperimentError> {
    let loaded = store.load(Scope::All)?;
    Ok(condition_metrics(&loaded.results, &STUDY2_KINDS)
        .iter()
        .map(SummaryRow::from)
        .collect())
}

pub fn write_summary<S: KeyValueStore>(
    store: &ResultStore<S>,
    path: &Path,
) -> Result<(), ExperimentError> {
    write_csv(path, &summary(store)?)?;
    Ok(())
}

/// Detailed metrics and the self-vs-within bootstrap table
pub fn analyze<S: KeyValueStore>(
    store: &ResultStore<S>,
    analysis_dir: &Path,
) -> Result<(), ExperimentError> {
    let loaded = store.load(Scope::All)?;
    if loaded.corrupt > 0 {
        tracing::warn!(corrupt = loaded.corrupt, "Skipped corrupt Study 2 records");
    }

    let metrics = condition_metrics(&loaded.results, &STUDY2_KINDS);
    write_csv(&analysis_dir.join(DETAILED_METRICS_FILE), &metrics)?;

    let mut estimator = BootstrapEstimator::default();
    let deltas = self_vs_within(&loaded.results, &mut estimator)
        .map_err(crate::analysis::AnalysisError::from)?;
    let rows: Vec<SelfWithinRow> = deltas.iter().map(SelfWithinRow::from).collect();
    write_csv(&analysis_dir.join(BOOTSTRAP_FILE), &rows)?;
    Ok(())
}
