//! Study 1: sentence generation
//!
//! Every matrix cell produces one stage-1 record generated at the cell's
//! temperature. Cells whose record exists are skipped, so an interrupted run
//! resumes where it stopped.

use crate::core::{ConditionMatrix, ModelId};
use crate::executor::{Executor, RunCounts};
use crate::store::{KeyValueStore, Study1Corpus};

pub const STAGE: &str = "study1";

/// Default matrix, optionally restricted to `models`
pub fn matrix(models: Option<&[ModelId]>) -> ConditionMatrix {
    match models {
        Some(models) => ConditionMatrix::default().with_models(models.to_vec()),
        None => ConditionMatrix::default(),
    }
}

pub async fn run<S: KeyValueStore>(
    executor: &Executor<'_>,
    corpus: &Study1Corpus<S>,
    matrix: &ConditionMatrix,
) -> RunCounts {
    tracing::info!(
        cells = matrix.len(),
        models = ?matrix.models.iter().map(|m| m.name()).collect::<Vec<_>>(),
        "Study 1 generation"
    );
    executor.generate(STAGE, corpus, matrix.cells()).await
}
