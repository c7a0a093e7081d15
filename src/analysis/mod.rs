//! Paired comparisons and classification metrics over stored results
//!
//! - `join`: inner join of two arms on source-sample identity
//! - `bootstrap`: paired bootstrap interval of a mean difference
//! - `metrics`: accuracy, balanced accuracy, macro-F1, majority baseline
//! - `report`: analysis tables and CSV output

pub mod bootstrap;
pub mod join;
pub mod metrics;
pub mod report;

pub use bootstrap::{
    mean, percentile, BootstrapError, BootstrapEstimate, BootstrapEstimator, DEFAULT_SEED,
    N_BOOTSTRAP,
};
pub use join::{pair_observations, pair_results, Observable, PairedArrays};
pub use metrics::{classification_metrics, metrics_by_group, ClassificationMetrics, GroupMetrics};
pub use report::{
    condition_metrics, info_density_delta, label_condition_metrics, paired_comparison,
    self_vs_within, write_csv, wrong_label_shift, ConditionMetricsRow, InfoDeltaRow,
    LabelCondition, LabelConditionMetricsRow, PairedMetricRow, SelfWithinRow, SummaryRow,
    WrongLabelShiftRow, STUDY2_KINDS,
};

use crate::store::StoreError;
use std::path::PathBuf;

/// Errors raised while loading results or writing tables
#[derive(Debug)]
pub enum AnalysisError {
    Store(StoreError),
    Bootstrap(BootstrapError),
    Csv(csv::Error),
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Store(e) => write!(f, "failed to load results: {}", e),
            AnalysisError::Bootstrap(e) => write!(f, "bootstrap failed: {}", e),
            AnalysisError::Csv(e) => write!(f, "failed to write table: {}", e),
            AnalysisError::Io { path, source } => {
                write!(f, "I/O error at '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Store(e) => Some(e),
            AnalysisError::Bootstrap(e) => Some(e),
            AnalysisError::Csv(e) => Some(e),
            AnalysisError::Io { source, .. } => Some(source),
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(e: StoreError) -> Self {
        AnalysisError::Store(e)
    }
}

impl From<BootstrapError> for AnalysisError {
    fn from(e: BootstrapError) -> Self {
        AnalysisError::Bootstrap(e)
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(e: csv::Error) -> Self {
        AnalysisError::Csv(e)
    }
}
