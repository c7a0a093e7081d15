//! Binary classification metrics per (predictor × group)

use crate::core::{Judgment, ModelId};
use std::collections::BTreeMap;

/// Metrics of one group of predictions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    /// Share of predictions matching the expected label
    pub accuracy: f64,
    /// Mean recall over the classes present in the expected labels
    pub balanced_accuracy: f64,
    /// Unweighted mean F1 over classes seen in either labels or predictions
    pub macro_f1: f64,
    /// Share of the most frequent expected class
    pub majority_baseline: f64,
    pub n_samples: usize,
}

impl ClassificationMetrics {
    fn empty() -> Self {
        Self {
            accuracy: f64::NAN,
            balanced_accuracy: f64::NAN,
            macro_f1: f64::NAN,
            majority_baseline: f64::NAN,
            n_samples: 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ClassCounts {
    true_count: usize,
    pred_count: usize,
    true_positive: usize,
}

/// Compute metrics from `(expected, predicted)` pairs
///
/// An empty input yields NaN for every metric. A class that is never
/// predicted contributes an F1 of 0.
pub fn classification_metrics(pairs: &[(Judgment, Judgment)]) -> ClassificationMetrics {
    if pairs.is_empty() {
        return ClassificationMetrics::empty();
    }
    let n = pairs.len() as f64;

    let mut classes: BTreeMap<Judgment, ClassCounts> = BTreeMap::new();
    let mut correct = 0usize;
    for &(expected, predicted) in pairs {
        classes.entry(expected).or_default().true_count += 1;
        classes.entry(predicted).or_default().pred_count += 1;
        if expected == predicted {
            correct += 1;
            classes.entry(expected).or_default().true_positive += 1;
        }
    }

    let recalls: Vec<f64> = classes
        .values()
        .filter(|c| c.true_count > 0)
        .map(|c| c.true_positive as f64 / c.true_count as f64)
        .collect();
    let balanced_accuracy = recalls.iter().sum::<f64>() / recalls.len() as f64;

    let f1s: Vec<f64> = classes
        .values()
        .map(|c| {
            let denom = c.true_count + c.pred_count;
            if denom == 0 {
                0.0
            } else {
                2.0 * c.true_positive as f64 / denom as f64
            }
        })
        .collect();
    let macro_f1 = f1s.iter().sum::<f64>() / f1s.len() as f64;

    let majority = classes.values().map(|c| c.true_count).max().unwrap_or(0);

    ClassificationMetrics {
        accuracy: correct as f64 / n,
        balanced_accuracy,
        macro_f1,
        majority_baseline: majority as f64 / n,
        n_samples: pairs.len(),
    }
}

/// Metrics for one (predictor, group) cell
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetrics<G> {
    pub predictor: ModelId,
    pub group: G,
    pub metrics: ClassificationMetrics,
}

/// Group observations by predictor and `G`, then compute metrics per group
///
/// Groups are ordered by predictor name, then by `G`'s ordering.
pub fn metrics_by_group<G, I>(observations: I) -> Vec<GroupMetrics<G>>
where
    G: Ord + Copy,
    I: IntoIterator<Item = (ModelId, G, Judgment, Judgment)>,
{
    let mut groups: BTreeMap<(&'static str, G), (ModelId, Vec<(Judgment, Judgment)>)> =
        BTreeMap::new();
    for (predictor, group, expected, predicted) in observations {
        groups
            .entry((predictor.name(), group))
            .or_insert_with(|| (predictor, Vec::new()))
            .1
            .push((expected, predicted));
    }

    groups
        .into_iter()
        .map(|((_, group), (predictor, pairs))| GroupMetrics {
            predictor,
            group,
            metrics: classification_metrics(&pairs),
        })
        .collect()
}
