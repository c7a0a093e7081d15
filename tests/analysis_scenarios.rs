//! End-to-end analysis over hand-built result stores

use introspection::analysis::{
    classification_metrics, pair_observations, pair_results, self_vs_within, BootstrapEstimator, Observable,
};
use introspection::core::{
    ConditionKind, ExperimentalCondition, ExperimentalResult, Judgment, ModelId, PromptStyle, Topic,
};
use introspection::experiments::{experiment_a, experiment_d, study2};
use introspection::store::{ResultStore, Scope};

fn result(
    kind: ConditionKind,
    generator: ModelId,
    predictor: ModelId,
    id: &str,
    expected: Judgment,
    predicted: Judgment,
) -> ExperimentalResult {
    ExperimentalResult::new(
        ExperimentalCondition {
            condition_type: kind,
            generator_model_id: generator,
            predictor_model_id: predictor,
            temperature: if expected == Judgment::High { 1.0 } else { 0.0 },
            expected_judgment: expected,
            prompt_type: PromptStyle::Factual,
            target: Topic::Elephant,
            source_loop_times: 0,
            source_unique_id: id.to_string(),
        },
        format!("sentence {}", id),
        "r",
        predicted,
        12,
    )
}

/// Four samples; self-reflection gets every one right, within-model two of four
fn study2_records() -> Vec<ExperimentalResult> {
    use Judgment::{High, Low};
    let g = ModelId::GptOss20b;
    let cases = [("s1", High, High, Low), ("s2", Low, Low, Low), ("s3", High, High, High), ("s4", Low, Low, High)];
    let mut records = Vec::new();
    for (id, expected, self_guess, within_guess) in cases {
        records.push(result(ConditionKind::SelfReflection, g, g, id, expected, self_guess));
        records.push(result(ConditionKind::WithinModel, g, g, id, expected, within_guess));
    }
    records
}

#[test]
fn test_study2_analysis_tables() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path().join("study2"));
    for record in study2_records() {
        assert!(store.write(&record, true).unwrap());
    }
    study2::write_summary(&store, &dir.path().join("study2").join(study2::SUMMARY_FILE)).unwrap();

    let analysis = dir.path().join("analysis");
    study2::analyze(&store, &analysis).unwrap();

    let detailed = std::fs::read_to_string(analysis.join(study2::DETAILED_METRICS_FILE)).unwrap();
    let mut lines = detailed.lines();
    assert_eq!(
        lines.next(),
        Some("predictor_model,condition_type,accuracy,balanced_accuracy,macro_f1,majority_baseline,n_samples")
    );
    assert!(detailed.contains("GPT_OSS_20B,self_reflection,1.0,1.0,1.0,0.5,4"));
    assert!(detailed.contains("GPT_OSS_20B,within_model,0.5,"));

    let bootstrap = std::fs::read_to_string(analysis.join(study2::BOOTSTRAP_FILE)).unwrap();
    let row = bootstrap.lines().nth(1).unwrap();
    let fields: Vec<&str> = row.split(',').collect();
    assert_eq!(fields[0], "GPT_OSS_20B");
    assert_eq!(fields[1], "0.5");
    assert_eq!(fields[4], "4");
    let lower: f64 = fields[2].parse().unwrap();
    let upper: f64 = fields[3].parse().unwrap();
    assert!(lower <= 0.5 && 0.5 <= upper);

    // The summary table sits inside the store directory and is not a record
    let reloaded = store.load(Scope::All).unwrap();
    assert_eq!(reloaded.len(), 8);
    assert_eq!(reloaded.corrupt, 0);
}

#[test]
fn test_bootstrap_matches_manual_join() {
    let records = study2_records();
    let self_arm = records
        .iter()
        .filter(|r| r.condition.condition_type == ConditionKind::SelfReflection);
    let within_arm = records
        .iter()
        .filter(|r| r.condition.condition_type == ConditionKind::WithinModel);
    let paired = pair_results(self_arm, within_arm, Observable::IsCorrect);
    assert_eq!(paired.ids, vec!["s1", "s2", "s3", "s4"]);

    let manual = BootstrapEstimator::seeded(7).with_iterations(500).estimate(&paired).unwrap();
    let rows = self_vs_within(&records, &mut BootstrapEstimator::seeded(7).with_iterations(500)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].point_estimate, manual.observed);
    assert_eq!(rows[0].ci_lower, manual.ci_lower);
    assert_eq!(rows[0].ci_upper, manual.ci_upper);
}

#[test]
fn test_join_keeps_shared_ids_in_sorted_order() {
    let a = vec![("id1".to_string(), 1.0), ("id3".to_string(), 1.0), ("id2".to_string(), 0.0)];
    let b = vec![("id4".to_string(), 1.0), ("id2".to_string(), 1.0), ("id3".to_string(), 0.0)];
    let paired = pair_observations(a, b);
    assert_eq!(paired.ids, vec!["id2", "id3"]);
    assert_eq!(paired.a, vec![0.0, 1.0]);
    assert_eq!(paired.b, vec![1.0, 0.0]);
    assert_eq!(paired.n_paired(), 2);
}

#[test]
fn test_corrupt_record_skipped_with_count() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path());
    let g = ModelId::Gemma3nE4b;
    for i in 0..9 {
        let record = result(
            ConditionKind::WithinModel,
            g,
            g,
            &format!("ok{}", i),
            Judgment::Low,
            Judgment::Low,
        );
        store.write(&record, true).unwrap();
    }
    let leaf = dir.path().join("within_model").join("GEMMA_3N_E4B").join("GEMMA_3N_E4B");
    std::fs::write(leaf.join("broken.json"), b"{ not json").unwrap();

    let loaded = store.load(Scope::Kind(ConditionKind::WithinModel)).unwrap();
    assert_eq!(loaded.len(), 9);
    assert_eq!(loaded.corrupt, 1);
}

#[test]
fn test_inconsistent_correctness_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path());
    let g = ModelId::GptOss20b;
    let mut record = result(ConditionKind::Blind, g, g, "x", Judgment::High, Judgment::Low);
    record.is_correct = true;
    store.write(&record, true).unwrap();
    store
        .write(&result(ConditionKind::Blind, g, g, "y", Judgment::High, Judgment::High), true)
        .unwrap();

    let loaded = store.load(Scope::All).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.corrupt, 1);
    assert_eq!(loaded.results[0].source_id(), "y");
}

#[test]
fn test_metrics_on_constant_predictor() {
    use Judgment::{High, Low};
    let pairs = [(High, High), (Low, High), (Low, High), (Low, High)];
    let m = classification_metrics(&pairs);
    assert_eq!(m.accuracy, 0.25);
    assert_eq!(m.balanced_accuracy, 0.5);
    assert_eq!(m.majority_baseline, 0.75);
    assert_eq!(m.n_samples, 4);
}

#[test]
fn test_metrics_on_one_missed_high() {
    use Judgment::{High, Low};
    let pairs = [(High, High), (High, Low), (Low, Low), (Low, Low)];
    let m = classification_metrics(&pairs);
    assert_eq!(m.accuracy, 0.75);
    assert_eq!(m.majority_baseline, 0.5);
    assert_eq!(m.balanced_accuracy, 0.75);
    // F1 is 2/3 for HIGH and 4/5 for LOW
    assert!((m.macro_f1 - 11.0 / 15.0).abs() < 1e-12);
    assert_eq!(m.n_samples, 4);
}

#[test]
fn test_experiment_a_and_d_tables() {
    use Judgment::{High, Low};
    let dir = tempfile::tempdir().unwrap();
    let g = ModelId::GptOss20b;
    let p = ModelId::Devstral;

    let predictions = ResultStore::open(dir.path().join("experiment_a"));
    for (id, plus, minus) in [("a", High, Low), ("b", High, High), ("c", Low, Low)] {
        predictions
            .write(&result(ConditionKind::InfoPlus, g, p, id, Low, plus), true)
            .unwrap();
        predictions
            .write(&result(ConditionKind::InfoMinus, g, p, id, Low, minus), true)
            .unwrap();
    }
    let analysis = dir.path().join("analysis");
    experiment_a::analyze(&predictions, &analysis).unwrap();
    let delta = std::fs::read_to_string(analysis.join(experiment_a::DELTA_FILE)).unwrap();
    let row = delta.lines().nth(1).unwrap();
    assert!(row.starts_with("DEVSTRAL,0.6667,0.3333,0.3333,"), "{}", row);
    assert!(row.ends_with(",3"));

    let full = ResultStore::open(dir.path().join("study2"));
    let ablation = ResultStore::open(dir.path().join("experiment_d"));
    for id in ["a", "b"] {
        full.write(&result(ConditionKind::WithinModel, g, g, id, High, High), true)
            .unwrap();
        ablation
            .write(&result(ConditionKind::Blind, g, g, id, High, Low), true)
            .unwrap();
        ablation
            .write(&result(ConditionKind::WrongLabel, g, g, id, High, High), true)
            .unwrap();
    }
    experiment_d::analyze(&full, &ablation, &analysis).unwrap();
    let accuracy = std::fs::read_to_string(analysis.join(experiment_d::ACCURACY_FILE)).unwrap();
    assert!(accuracy.contains("GPT_OSS_20B,full,1.0,"));
    assert!(accuracy.contains("GPT_OSS_20B,blind,0.0,"));
    assert!(analysis.join(experiment_d::SHIFT_FILE).exists());
}
