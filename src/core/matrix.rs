//! Condition matrix for stage-1 generation
//!
//! Enumerates model × temperature × prompt style × topic × repeat. The
//! enumeration order is fixed (outermost first) so logs read the same on every
//! run; correctness never depends on it because every cell maps to its own
//! storage key.

use crate::core::model::{ModelId, PromptStyle, Topic};

/// One generation cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationCell {
    pub model: ModelId,
    pub temperature: f64,
    pub prompt_style: PromptStyle,
    pub topic: Topic,
    /// 0-based repetition index within the cell
    pub repeat: u32,
}

/// Cartesian product of the experimental factors
#[derive(Debug, Clone)]
pub struct ConditionMatrix {
    pub models: Vec<ModelId>,
    pub temperatures: Vec<f64>,
    pub prompt_styles: Vec<PromptStyle>,
    pub topics: Vec<Topic>,
    pub repeats: u32,
}

impl Default for ConditionMatrix {
    fn default() -> Self {
        Self {
            models: vec![ModelId::Qwen3Coder30b, ModelId::Gemma3nE4b, ModelId::GptOss20b],
            temperatures: temperature_grid(0.0, 1.0, 0.1),
            prompt_styles: PromptStyle::ALL.to_vec(),
            topics: Topic::ALL.to_vec(),
            repeats: 3,
        }
    }
}

impl ConditionMatrix {
    /// Restrict the matrix to the given models
    pub fn with_models(mut self, models: Vec<ModelId>) -> Self {
        self.models = models;
        self
    }

    /// Set the repeat count per cell
    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats;
        self
    }

    /// Replace the temperature grid
    pub fn with_temperatures(mut self, temperatures: Vec<f64>) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// Total number of cells including repeats
    pub fn len(&self) -> usize {
        self.models.len()
            * self.temperatures.len()
            * self.prompt_styles.len()
            * self.topics.len()
            * self.repeats as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every cell in deterministic order
    pub fn cells(&self) -> impl Iterator<Item = GenerationCell> + '_ {
        self.models.iter().flat_map(move |&model| {
            self.temperatures.iter().flat_map(move |&temperature| {
                self.prompt_styles.iter().flat_map(move |&prompt_style| {
                    self.topics.iter().flat_map(move |&topic| {
                        (0..self.repeats).map(move |repeat| GenerationCell {
                            model,
                            temperature,
                            prompt_style,
                            topic,
                            repeat,
                        })
                    })
                })
            })
        })
    }
}

/// Evenly spaced temperatures from `start` to `stop` inclusive, rounded to one decimal
///
/// Steps are computed from an integer index so the grid carries no
/// accumulated floating-point drift.
pub fn temperature_grid(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop < start {
        return Vec::new();
    }
    let count = ((stop - start) / step + 1e-9).floor() as usize + 1;
    (0..count)
        .map(|i| ((start + i as f64 * step) * 10.0).round() / 10.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid() {
        let grid = temperature_grid(0.0, 1.0, 0.1);
        assert_eq!(grid.len(), 11);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[3], 0.3);
        assert_eq!(grid[10], 1.0);
    }

    #[test]
    fn test_empty_grid_for_bad_step() {
        assert!(temperature_grid(0.0, 1.0, 0.0).is_empty());
        assert!(temperature_grid(1.0, 0.0, 0.1).is_empty());
    }

    #[test]
    fn test_default_matrix_size() {
        let matrix = ConditionMatrix::default();
        // 3 models × 11 temps × 3 styles × 4 topics × 3 repeats
        assert_eq!(matrix.len(), 3 * 11 * 3 * 4 * 3);
        assert_eq!(matrix.cells().count(), matrix.len());
    }

    #[test]
    fn test_cells_order_is_deterministic() {
        let matrix = ConditionMatrix::default()
            .with_models(vec![ModelId::Gemma3nE4b])
            .with_temperatures(vec![0.0, 1.0])
            .with_repeats(2);

        let first: Vec<_> = matrix.cells().collect();
        let second: Vec<_> = matrix.cells().collect();
        assert_eq!(first, second);

        assert_eq!(first[0].temperature, 0.0);
        assert_eq!(first[0].repeat, 0);
        assert_eq!(first[1].repeat, 1);
        assert_eq!(first[0].prompt_style, PromptStyle::Factual);
        assert_eq!(first.last().unwrap().temperature, 1.0);
    }

    #[test]
    fn test_zero_repeats_is_empty() {
        let matrix = ConditionMatrix::default().with_repeats(0);
        assert!(matrix.is_empty());
        assert_eq!(matrix.cells().count(), 0);
    }
}
