//! Experiment stages and their analyses
//!
//! - `study1`: sentence generation over the condition matrix
//! - `study2`: self-reflection, within-model and across-model prediction
//! - `experiment_a`: Info+/Info− rewrites and predictions on both variants
//! - `experiment_d`: blind and wrong-label predictions
//!
//! Stage functions take their stores and an [`Executor`](crate::executor::Executor)
//! by reference, so tests run them against in-memory stores and a scripted
//! invoker.

pub mod experiment_a;
pub mod experiment_d;
pub mod study1;
pub mod study2;

use crate::analysis::AnalysisError;
use crate::core::{ModelId, SourceSample};
use crate::store::StoreError;

/// Fatal stage error; per-condition failures are counted, not returned
#[derive(Debug)]
pub enum ExperimentError {
    Store(StoreError),
    Analysis(AnalysisError),
}

impl std::fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentError::Store(e) => write!(f, "{}", e),
            ExperimentError::Analysis(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ExperimentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExperimentError::Store(e) => Some(e),
            ExperimentError::Analysis(e) => Some(e),
        }
    }
}

impl From<StoreError> for ExperimentError {
    fn from(e: StoreError) -> Self {
        ExperimentError::Store(e)
    }
}

impl From<AnalysisError> for ExperimentError {
    fn from(e: AnalysisError) -> Self {
        ExperimentError::Analysis(e)
    }
}

/// Distinct generators of `samples`, ordered by name
pub fn generators_of(samples: &[SourceSample]) -> Vec<ModelId> {
    let mut generators: Vec<ModelId> = samples.iter().map(|s| s.generator).collect();
    generators.sort_by_key(|m| m.name());
    generators.dedup();
    generators
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample;
    use super::*;
    use crate::core::{Judgment, PromptStyle};

    #[test]
    fn test_generators_sorted_by_name_and_unique() {
        let samples = vec![
            sample("a", ModelId::GptOss20b, PromptStyle::Factual, 0.0, Judgment::Low),
            sample("b", ModelId::Gemma3nE4b, PromptStyle::Factual, 0.0, Judgment::Low),
            sample("c", ModelId::GptOss20b, PromptStyle::Factual, 0.0, Judgment::Low),
        ];
        assert_eq!(
            generators_of(&samples),
            vec![ModelId::Gemma3nE4b, ModelId::GptOss20b]
        );
    }
}
