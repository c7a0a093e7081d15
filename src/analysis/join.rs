//! Inner join of two result sets on source-sample identity

use crate::core::{ExperimentalResult, Judgment};
use std::collections::BTreeMap;

/// Per-result quantity compared across arms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observable {
    /// 1.0 when the predictor answered HIGH
    IsHigh,
    /// 1.0 when the prediction matched the expected label
    IsCorrect,
}

impl Observable {
    pub fn of(self, result: &ExperimentalResult) -> f64 {
        let hit = match self {
            Observable::IsHigh => result.predicted_judgment == Judgment::High,
            Observable::IsCorrect => result.is_correct,
        };
        if hit {
            1.0
        } else {
            0.0
        }
    }
}

/// Aligned observations for the ids present in both inputs, in sorted id order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedArrays {
    pub ids: Vec<String>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl PairedArrays {
    pub fn n_paired(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Join two `(id, value)` collections
///
/// When an id repeats within one collection the last occurrence wins. Ids
/// missing from either side are dropped.
pub fn pair_observations<A, B>(a: A, b: B) -> PairedArrays
where
    A: IntoIterator<Item = (String, f64)>,
    B: IntoIterator<Item = (String, f64)>,
{
    let left: BTreeMap<String, f64> = a.into_iter().collect();
    let right: BTreeMap<String, f64> = b.into_iter().collect();

    let mut paired = PairedArrays::default();
    for (id, value) in left {
        if let Some(&other) = right.get(&id) {
            paired.a.push(value);
            paired.b.push(other);
            paired.ids.push(id);
        }
    }
    paired
}

/// Join two result sets on `source_unique_id`
pub fn pair_results<'a, A, B>(a: A, b: B, observable: Observable) -> PairedArrays
where
    A: IntoIterator<Item = &'a ExperimentalResult>,
    B: IntoIterator<Item = &'a ExperimentalResult>,
{
    pair_observations(
        a.into_iter()
            .map(|r| (r.source_id().to_string(), observable.of(r))),
        b.into_iter()
            .map(|r| (r.source_id().to_string(), observable.of(r))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(items: &[(&str, f64)]) -> Vec<(String, f64)> {
        items.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn test_inner_join_sorted() {
        let paired = pair_observations(
            obs(&[("c", 1.0), ("a", 0.0), ("x", 1.0)]),
            obs(&[("a", 1.0), ("c", 0.0), ("y", 0.0)]),
        );
        assert_eq!(paired.ids, vec!["a", "c"]);
        assert_eq!(paired.a, vec![0.0, 1.0]);
        assert_eq!(paired.b, vec![1.0, 0.0]);
        assert_eq!(paired.n_paired(), 2);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let paired = pair_observations(
            obs(&[("a", 0.0), ("a", 1.0)]),
            obs(&[("a", 0.0)]),
        );
        assert_eq!(paired.a, vec![1.0]);
    }

    #[test]
    fn test_disjoint_is_empty() {
        let paired = pair_observations(obs(&[("a", 1.0)]), obs(&[("b", 1.0)]));
        assert!(paired.is_empty());
        assert_eq!(paired.n_paired(), 0);
    }
}
