//! Analysis tables
//!
//! Every table is computed from loaded results and written as CSV. Values are
//! kept at full precision in memory; the CSV columns are rounded to four
//! decimals and non-finite values become empty cells.

use super::bootstrap::{mean, BootstrapError, BootstrapEstimate, BootstrapEstimator};
use super::join::{pair_results, Observable};
use super::metrics::{metrics_by_group, ClassificationMetrics, GroupMetrics};
use super::AnalysisError;
use crate::core::{ConditionKind, ExperimentalResult, ModelId, PromptStyle};
use rand::Rng;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::Path;

fn round4<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(&((value * 10_000.0).round() / 10_000.0))
    } else {
        serializer.serialize_none()
    }
}

fn model_name<S: Serializer>(model: &ModelId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(model.name())
}

/// Predictors appearing in any of the inputs, sorted by name
fn predictors(sets: &[&[ExperimentalResult]]) -> Vec<ModelId> {
    let names: BTreeSet<(&'static str, ModelId)> = sets
        .iter()
        .flat_map(|set| set.iter())
        .map(|r| {
            let p = r.condition.predictor_model_id;
            (p.name(), p)
        })
        .collect();
    names.into_iter().map(|(_, p)| p).collect()
}

fn select<'a>(
    results: &'a [ExperimentalResult],
    predictor: ModelId,
    kind: ConditionKind,
) -> impl Iterator<Item = &'a ExperimentalResult> + Clone {
    results.iter().filter(move |r| {
        r.condition.predictor_model_id == predictor && r.condition.condition_type == kind
    })
}

// ============================================================================
// Metric tables
// ============================================================================

/// One row of the per-condition metrics table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionMetricsRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    pub condition_type: ConditionKind,
    #[serde(serialize_with = "round4")]
    pub accuracy: f64,
    #[serde(serialize_with = "round4")]
    pub balanced_accuracy: f64,
    #[serde(serialize_with = "round4")]
    pub macro_f1: f64,
    #[serde(serialize_with = "round4")]
    pub majority_baseline: f64,
    pub n_samples: usize,
}

impl From<GroupMetrics<ConditionKind>> for ConditionMetricsRow {
    fn from(g: GroupMetrics<ConditionKind>) -> Self {
        let ClassificationMetrics {
            accuracy,
            balanced_accuracy,
            macro_f1,
            majority_baseline,
            n_samples,
        } = g.metrics;
        Self {
            predictor_model: g.predictor,
            condition_type: g.group,
            accuracy,
            balanced_accuracy,
            macro_f1,
            majority_baseline,
            n_samples,
        }
    }
}

/// Metrics per predictor and condition kind, restricted to `kinds`
pub fn condition_metrics(results: &[ExperimentalResult], kinds: &[ConditionKind]) -> Vec<ConditionMetricsRow> {
    metrics_by_group(
        results
            .iter()
            .filter(|r| kinds.contains(&r.condition.condition_type))
            .map(|r| {
                (
                    r.condition.predictor_model_id,
                    r.condition.condition_type,
                    r.condition.expected_judgment,
                    r.predicted_judgment,
                )
            }),
    )
    .into_iter()
    .map(ConditionMetricsRow::from)
    .collect()
}

/// Study 2 condition kinds
pub const STUDY2_KINDS: [ConditionKind; 3] = [
    ConditionKind::SelfReflection,
    ConditionKind::WithinModel,
    ConditionKind::AcrossModel,
];

/// Per-stage accuracy summary row (`summary.csv`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "predictor", serialize_with = "model_name")]
    pub predictor_model: ModelId,
    #[serde(rename = "condition")]
    pub condition_type: ConditionKind,
    #[serde(serialize_with = "round4")]
    pub accuracy: f64,
    pub n_samples: usize,
}

impl From<&ConditionMetricsRow> for SummaryRow {
    fn from(row: &ConditionMetricsRow) -> Self {
        Self {
            predictor_model: row.predictor_model,
            condition_type: row.condition_type,
            accuracy: row.accuracy,
            n_samples: row.n_samples,
        }
    }
}

/// Label condition compared in the label-ablation analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelCondition {
    /// Style and topic shown truthfully (Study 2 within-model)
    Full,
    Blind,
    WrongLabel,
}

impl LabelCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelCondition::Full => "full",
            LabelCondition::Blind => "blind",
            LabelCondition::WrongLabel => "wrong_label",
        }
    }

    fn of_kind(kind: ConditionKind) -> Option<Self> {
        match kind {
            ConditionKind::Blind => Some(LabelCondition::Blind),
            ConditionKind::WrongLabel => Some(LabelCondition::WrongLabel),
            _ => None,
        }
    }
}

/// One row of the label-condition metrics table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelConditionMetricsRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    pub label_condition: LabelCondition,
    #[serde(serialize_with = "round4")]
    pub accuracy: f64,
    #[serde(serialize_with = "round4")]
    pub balanced_accuracy: f64,
    #[serde(serialize_with = "round4")]
    pub macro_f1: f64,
    #[serde(serialize_with = "round4")]
    pub majority_baseline: f64,
    pub n_samples: usize,
}

/// Metrics per predictor for full (within-model), blind and wrong-label arms
///
/// `full` is read for its within-model results only; `ablation` for its blind
/// and wrong-label results.
pub fn label_condition_metrics<'a>(
    full: &'a [ExperimentalResult],
    ablation: &'a [ExperimentalResult],
) -> Vec<LabelConditionMetricsRow> {
    let full_obs = full
        .iter()
        .filter(|r| r.condition.condition_type == ConditionKind::WithinModel)
        .map(|r| (r, LabelCondition::Full));
    let ablation_obs = ablation.iter().filter_map(|r| {
        LabelCondition::of_kind(r.condition.condition_type).map(|label| (r, label))
    });

    metrics_by_group(full_obs.chain(ablation_obs).map(|(r, label)| {
        (
            r.condition.predictor_model_id,
            label,
            r.condition.expected_judgment,
            r.predicted_judgment,
        )
    }))
    .into_iter()
    .map(|g| {
        let m = g.metrics;
        LabelConditionMetricsRow {
            predictor_model: g.predictor,
            label_condition: g.group,
            accuracy: m.accuracy,
            balanced_accuracy: m.balanced_accuracy,
            macro_f1: m.macro_f1,
            majority_baseline: m.majority_baseline,
            n_samples: m.n_samples,
        }
    })
    .collect()
}

// ============================================================================
// Paired bootstrap tables
// ============================================================================

/// Paired comparison of two arms for one predictor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedMetricRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    pub grouping_key: String,
    #[serde(serialize_with = "round4")]
    pub point_estimate: f64,
    #[serde(serialize_with = "round4")]
    pub ci_lower: f64,
    #[serde(serialize_with = "round4")]
    pub ci_upper: f64,
    pub n_paired: usize,
}

impl PairedMetricRow {
    fn new(predictor: ModelId, grouping_key: impl Into<String>, estimate: BootstrapEstimate) -> Self {
        Self {
            predictor_model: predictor,
            grouping_key: grouping_key.into(),
            point_estimate: estimate.observed,
            ci_lower: estimate.ci_lower,
            ci_upper: estimate.ci_upper,
            n_paired: estimate.n_paired,
        }
    }
}

/// Generic paired comparison of `a - b` per predictor
///
/// Predictors lacking either arm are left out. Predictors are visited in name
/// order so a shared estimator produces the same table on every run.
pub fn paired_comparison<R: Rng>(
    results: &[ExperimentalResult],
    a: ConditionKind,
    b: ConditionKind,
    observable: Observable,
    estimator: &mut BootstrapEstimator<R>,
) -> Result<Vec<PairedMetricRow>, BootstrapError> {
    let key = format!("{}-{}", a.as_str(), b.as_str());
    let mut rows = Vec::new();
    for predictor in predictors(&[results]) {
        let left = select(results, predictor, a);
        let right = select(results, predictor, b);
        if left.clone().next().is_none() || right.clone().next().is_none() {
            continue;
        }
        let paired = pair_results(left, right, observable);
        rows.push(PairedMetricRow::new(predictor, key.clone(), estimator.estimate(&paired)?));
    }
    Ok(rows)
}

/// Δ(self-reflection − within-model) of correctness per predictor
pub fn self_vs_within<R: Rng>(
    results: &[ExperimentalResult],
    estimator: &mut BootstrapEstimator<R>,
) -> Result<Vec<PairedMetricRow>, BootstrapError> {
    paired_comparison(
        results,
        ConditionKind::SelfReflection,
        ConditionKind::WithinModel,
        Observable::IsCorrect,
        estimator,
    )
}

/// CSV row of the self-vs-within table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfWithinRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    #[serde(serialize_with = "round4")]
    pub delta_self_within: f64,
    #[serde(serialize_with = "round4")]
    pub ci_lower: f64,
    #[serde(serialize_with = "round4")]
    pub ci_upper: f64,
    pub n_paired: usize,
}

impl From<&PairedMetricRow> for SelfWithinRow {
    fn from(row: &PairedMetricRow) -> Self {
        Self {
            predictor_model: row.predictor_model,
            delta_self_within: row.point_estimate,
            ci_lower: row.ci_lower,
            ci_upper: row.ci_upper,
            n_paired: row.n_paired,
        }
    }
}

/// P(HIGH | Info+) − P(HIGH | Info−) for one predictor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoDeltaRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    #[serde(serialize_with = "round4")]
    pub p_high_info_plus: f64,
    #[serde(serialize_with = "round4")]
    pub p_high_info_minus: f64,
    #[serde(serialize_with = "round4")]
    pub delta: f64,
    #[serde(serialize_with = "round4")]
    pub ci_lower: f64,
    #[serde(serialize_with = "round4")]
    pub ci_upper: f64,
    pub n_pairs: usize,
}

/// Info-density bias per predictor, shares computed over paired samples
pub fn info_density_delta<R: Rng>(
    results: &[ExperimentalResult],
    estimator: &mut BootstrapEstimator<R>,
) -> Result<Vec<InfoDeltaRow>, BootstrapError> {
    let mut rows = Vec::new();
    for predictor in predictors(&[results]) {
        let plus = select(results, predictor, ConditionKind::InfoPlus);
        let minus = select(results, predictor, ConditionKind::InfoMinus);
        if plus.clone().next().is_none() || minus.clone().next().is_none() {
            continue;
        }
        let paired = pair_results(plus, minus, Observable::IsHigh);
        let estimate = estimator.estimate(&paired)?;
        rows.push(InfoDeltaRow {
            predictor_model: predictor,
            p_high_info_plus: mean(&paired.a),
            p_high_info_minus: mean(&paired.b),
            delta: estimate.observed,
            ci_lower: estimate.ci_lower,
            ci_upper: estimate.ci_upper,
            n_pairs: estimate.n_paired,
        });
    }
    Ok(rows)
}

/// Shift in P(HIGH) when the style label is swapped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrongLabelShiftRow {
    #[serde(serialize_with = "model_name")]
    pub predictor_model: ModelId,
    pub swap_direction: String,
    pub original_prompt_type: String,
    #[serde(serialize_with = "round4")]
    pub p_high_full: f64,
    #[serde(serialize_with = "round4")]
    pub p_high_wrong_label: f64,
    #[serde(serialize_with = "round4")]
    pub delta_p_high: f64,
    #[serde(serialize_with = "round4")]
    pub ci_lower: f64,
    #[serde(serialize_with = "round4")]
    pub ci_upper: f64,
    pub n_full: usize,
    pub n_wrong_label: usize,
    pub n_paired: usize,
}

fn p_high<'a>(results: impl Iterator<Item = &'a ExperimentalResult>) -> (f64, usize) {
    let values: Vec<f64> = results.map(|r| Observable::IsHigh.of(r)).collect();
    (mean(&values), values.len())
}

/// Wrong-label shift per predictor and original style
///
/// The shares compare all full (within-model) against all wrong-label results
/// of a style. The interval comes from the paired subset (wrong-label − full)
/// and is NaN when no sample appears in both.
pub fn wrong_label_shift<'a, R: Rng>(
    full: &'a [ExperimentalResult],
    ablation: &'a [ExperimentalResult],
    estimator: &mut BootstrapEstimator<R>,
) -> Result<Vec<WrongLabelShiftRow>, BootstrapError> {
    let mut rows = Vec::new();
    for predictor in predictors(&[full, ablation]) {
        for style in [PromptStyle::Factual, PromptStyle::Absurd] {
            let full_style = select(full, predictor, ConditionKind::WithinModel)
                .filter(move |r| r.condition.prompt_type == style);
            let wrong_style = select(ablation, predictor, ConditionKind::WrongLabel)
                .filter(move |r| r.condition.prompt_type == style);

            let (p_high_full, n_full) = p_high(full_style.clone());
            let (p_high_wrong_label, n_wrong_label) = p_high(wrong_style.clone());
            if n_full == 0 || n_wrong_label == 0 {
                continue;
            }

            let paired = pair_results(wrong_style, full_style, Observable::IsHigh);
            let estimate = estimator.estimate(&paired)?;
            let shown = style.swapped().map(PromptStyle::name).unwrap_or(style.name());

            rows.push(WrongLabelShiftRow {
                predictor_model: predictor,
                swap_direction: format!("{}->{}", style.name(), shown),
                original_prompt_type: style.name().to_string(),
                p_high_full,
                p_high_wrong_label,
                delta_p_high: p_high_wrong_label - p_high_full,
                ci_lower: estimate.ci_lower,
                ci_upper: estimate.ci_upper,
                n_full,
                n_wrong_label,
                n_paired: estimate.n_paired,
            });
        }
    }
    Ok(rows)
}

// ============================================================================
// CSV output
// ============================================================================

/// Write rows as a CSV table, creating parent directories
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| AnalysisError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExperimentalCondition, Judgment, Topic};

    fn result(
        kind: ConditionKind,
        predictor: ModelId,
        id: &str,
        style: PromptStyle,
        expected: Judgment,
        predicted: Judgment,
    ) -> ExperimentalResult {
        ExperimentalResult::new(
            ExperimentalCondition {
                condition_type: kind,
                generator_model_id: predictor,
                predictor_model_id: predictor,
                temperature: if expected == Judgment::High { 1.0 } else { 0.0 },
                expected_judgment: expected,
                prompt_type: style,
                target: Topic::Elephant,
                source_loop_times: 0,
                source_unique_id: id.to_string(),
            },
            "s",
            "r",
            predicted,
            0,
        )
    }

    #[test]
    fn test_self_vs_within_pairs_by_id() {
        use ConditionKind::{SelfReflection, WithinModel};
        use Judgment::{High, Low};
        let p = ModelId::GptOss20b;
        let results = vec![
            result(SelfReflection, p, "a", PromptStyle::Normal, High, High),
            result(SelfReflection, p, "b", PromptStyle::Normal, Low, Low),
            result(SelfReflection, p, "only-self", PromptStyle::Normal, Low, Low),
            result(WithinModel, p, "a", PromptStyle::Normal, High, Low),
            result(WithinModel, p, "b", PromptStyle::Normal, Low, Low),
        ];
        let rows = self_vs_within(&results, &mut BootstrapEstimator::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n_paired, 2);
        assert!((rows[0].point_estimate - 0.5).abs() < 1e-12);
        assert_eq!(rows[0].grouping_key, "self_reflection-within_model");
    }

    #[test]
    fn test_predictor_without_both_arms_is_skipped() {
        let results = vec![result(
            ConditionKind::SelfReflection,
            ModelId::Devstral,
            "a",
            PromptStyle::Normal,
            Judgment::Low,
            Judgment::Low,
        )];
        let rows = self_vs_within(&results, &mut BootstrapEstimator::default()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_wrong_label_shift_without_overlap_has_no_interval() {
        use Judgment::{High, Low};
        let p = ModelId::NovaMicro;
        let full = vec![
            result(ConditionKind::WithinModel, p, "a", PromptStyle::Factual, Low, Low),
            result(ConditionKind::WithinModel, p, "b", PromptStyle::Factual, Low, High),
        ];
        let wrong = vec![result(ConditionKind::WrongLabel, p, "z", PromptStyle::Factual, Low, High)];
        let rows = wrong_label_shift(&full, &wrong, &mut BootstrapEstimator::default()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.swap_direction, "FACTUAL->ABSURD");
        assert!((row.delta_p_high - 0.5).abs() < 1e-12);
        assert_eq!((row.n_full, row.n_wrong_label, row.n_paired), (2, 1, 0));
        assert!(row.ci_lower.is_nan() && row.ci_upper.is_nan());
    }

    #[test]
    fn test_label_condition_order() {
        use Judgment::Low;
        let p = ModelId::Gemma3nE4b;
        let full = vec![result(ConditionKind::WithinModel, p, "a", PromptStyle::Normal, Low, Low)];
        let ablation = vec![
            result(ConditionKind::WrongLabel, p, "a", PromptStyle::Factual, Low, Low),
            result(ConditionKind::Blind, p, "a", PromptStyle::Normal, Low, Low),
        ];
        let rows = label_condition_metrics(&full, &ablation);
        let order: Vec<_> = rows.iter().map(|r| r.label_condition).collect();
        assert_eq!(
            order,
            vec![LabelCondition::Full, LabelCondition::Blind, LabelCondition::WrongLabel]
        );
    }

    #[test]
    fn test_csv_rounds_and_blanks_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/table.csv");
        let rows = vec![PairedMetricRow {
            predictor_model: ModelId::NovaMicro,
            grouping_key: "k".to_string(),
            point_estimate: 0.123456,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
            n_paired: 0,
        }];
        write_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("predictor_model,grouping_key,point_estimate,ci_lower,ci_upper,n_paired")
        );
        assert_eq!(lines.next(), Some("NOVA_MICRO,k,0.1235,,,0"));
    }
}
