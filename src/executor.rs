//! Sequential condition executor
//!
//! Every stage hands the executor a batch of work items. Each item is keyed,
//! checked for an existing record, then rendered, sent to the model, parsed and
//! written. A failing item is counted and reported on the event bus; the batch
//! always runs to the end.

use crate::core::{
    EditResponse, EditedPair, ExperimentalCondition, ExperimentalResult, GenerationCell,
    GenerationCondition, GenerationRecord, GenerationResponse, ModelId, PredictionResponse,
    PromptStyle, SourceSample,
};
use crate::events::{EventBus, ExperimentEvent};
use crate::llm::{parse_structured, response_schema, LlmError, LlmInvoker, LlmRequest};
use crate::prompt::{self, PromptError, PromptRenderer};
use crate::store::{EditedPairStore, KeyValueStore, ResultStore, StoreError, Study1Corpus};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

/// Sampling temperature of predictor and editor calls
pub const JUDGE_TEMPERATURE: f64 = 0.0;

/// Outcome tally of one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunCounts {
    pub fn merge(&mut self, other: RunCounts) {
        self.saved += other.saved;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.saved + self.skipped + self.failed
    }
}

impl std::fmt::Display for RunCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "saved={} skipped={} failed={}",
            self.saved, self.skipped, self.failed
        )
    }
}

/// Why a single condition could not be completed
#[derive(Debug)]
pub enum ExecutionError {
    Prompt(PromptError),
    Llm(LlmError),
    Parse(String),
    Store(StoreError),
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::Prompt(e) => write!(f, "prompt error: {}", e),
            ExecutionError::Llm(e) => write!(f, "LLM error: {}", e),
            ExecutionError::Parse(msg) => write!(f, "unparseable response: {}", msg),
            ExecutionError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Prompt(e) => Some(e),
            ExecutionError::Llm(e) => Some(e),
            ExecutionError::Parse(_) => None,
            ExecutionError::Store(e) => Some(e),
        }
    }
}

impl From<PromptError> for ExecutionError {
    fn from(e: PromptError) -> Self {
        ExecutionError::Prompt(e)
    }
}

impl From<LlmError> for ExecutionError {
    fn from(e: LlmError) -> Self {
        ExecutionError::Llm(e)
    }
}

impl From<StoreError> for ExecutionError {
    fn from(e: StoreError) -> Self {
        ExecutionError::Store(e)
    }
}

enum Outcome {
    Saved { latency_ms: u64 },
    Skipped,
}

/// One prediction: the condition, the sentence shown and the prompt to use
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTask {
    pub condition: ExperimentalCondition,
    /// Sentence shown to the predictor and stored with the result
    pub sentence: String,
    pub template: &'static str,
    pub vars: Vec<(&'static str, String)>,
}

impl PredictionTask {
    /// Prediction with topic and `shown_style` in the prompt
    ///
    /// `shown_style` differs from the condition's own style only in the
    /// wrong-label arm.
    pub fn labelled(
        condition: ExperimentalCondition,
        sentence: impl Into<String>,
        shown_style: PromptStyle,
    ) -> Self {
        let sentence = sentence.into();
        let vars = vec![
            ("target", condition.target.value().to_string()),
            ("prompt_type", shown_style.value().to_string()),
            ("generated_sentence", sentence.clone()),
        ];
        Self {
            condition,
            sentence,
            template: prompt::PREDICTION,
            vars,
        }
    }

    /// Prediction from the sentence alone
    pub fn blind(condition: ExperimentalCondition, sentence: impl Into<String>) -> Self {
        let sentence = sentence.into();
        Self {
            vars: vec![("generated_sentence", sentence.clone())],
            condition,
            sentence,
            template: prompt::PREDICTION_BLIND,
        }
    }
}

/// `kind/GENERATOR/PREDICTOR/id`, the identity reported for a condition
pub fn condition_label(condition: &ExperimentalCondition) -> String {
    format!(
        "{}/{}/{}/{}",
        condition.condition_type,
        condition.generator_model_id.name(),
        condition.predictor_model_id.name(),
        condition.source_unique_id
    )
}

pub struct Executor<'a> {
    invoker: &'a dyn LlmInvoker,
    prompts: &'a dyn PromptRenderer,
    bus: EventBus,
    skip_existing: bool,
}

impl<'a> Executor<'a> {
    pub fn new(invoker: &'a dyn LlmInvoker, prompts: &'a dyn PromptRenderer, bus: EventBus) -> Self {
        Self {
            invoker,
            prompts,
            bus,
            skip_existing: true,
        }
    }

    /// Re-run items whose record already exists when `false`
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn skip_existing(&self) -> bool {
        self.skip_existing
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Render, invoke and parse one structured reply
    async fn ask<T>(
        &self,
        model: ModelId,
        temperature: f64,
        template: &str,
        vars: &[(&str, &str)],
        schema_name: &str,
    ) -> Result<(T, u64), ExecutionError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let text = self.prompts.render(template, vars)?;
        let request =
            LlmRequest::new(model, temperature, text).with_schema(response_schema::<T>(schema_name));
        let response = self.invoker.invoke(request).await?;
        let parsed =
            parse_structured(&response.content).map_err(|e| ExecutionError::Parse(e.to_string()))?;
        Ok((parsed, response.latency.as_millis() as u64))
    }

    fn start(&self, stage: &str, total: usize) {
        self.bus.emit(ExperimentEvent::stage_started(stage, total));
    }

    fn tally(
        &self,
        stage: &str,
        label: &str,
        outcome: Result<Outcome, ExecutionError>,
        counts: &mut RunCounts,
    ) {
        match outcome {
            Ok(Outcome::Saved { latency_ms }) => {
                counts.saved += 1;
                self.bus
                    .emit(ExperimentEvent::result_saved(stage, label, latency_ms));
            }
            Ok(Outcome::Skipped) => {
                counts.skipped += 1;
                self.bus.emit(ExperimentEvent::result_skipped(stage, label));
            }
            Err(e) => {
                counts.failed += 1;
                tracing::warn!(stage = stage, condition = %label, error = %e, "Condition failed");
                self.bus
                    .emit(ExperimentEvent::condition_failed(stage, label, &e));
            }
        }
    }

    fn finish(&self, stage: &str, counts: RunCounts) -> RunCounts {
        self.bus.emit(ExperimentEvent::stage_completed(
            stage,
            counts.saved,
            counts.skipped,
            counts.failed,
        ));
        counts
    }

    // ------------------------------------------------------------------
    // Stage 1
    // ------------------------------------------------------------------

    /// Generate one stage-1 record per cell, at the cell's temperature
    pub async fn generate<S: KeyValueStore>(
        &self,
        stage: &str,
        corpus: &Study1Corpus<S>,
        cells: impl IntoIterator<Item = GenerationCell>,
    ) -> RunCounts {
        let cells: Vec<GenerationCell> = cells.into_iter().collect();
        self.start(stage, cells.len());
        let mut counts = RunCounts::default();
        for cell in cells {
            let label = format!(
                "{}/{}/{}/temp_{}_loop_{}",
                cell.model.name(),
                cell.topic.name(),
                cell.prompt_style.name(),
                crate::core::format_temperature(cell.temperature),
                cell.repeat
            );
            let outcome = self.generate_one(corpus, &cell).await;
            self.tally(stage, &label, outcome, &mut counts);
        }
        self.finish(stage, counts)
    }

    async fn generate_one<S: KeyValueStore>(
        &self,
        corpus: &Study1Corpus<S>,
        cell: &GenerationCell,
    ) -> Result<Outcome, ExecutionError> {
        let key = corpus.key_for(
            cell.model,
            cell.topic,
            cell.prompt_style,
            cell.temperature,
            cell.repeat,
        )?;
        if self.skip_existing && corpus.exists(&key)? {
            return Ok(Outcome::Skipped);
        }
        let vars = [
            ("target", cell.topic.value()),
            ("prompt_type", cell.prompt_style.value()),
        ];
        let (response, latency_ms): (GenerationResponse, u64) = self
            .ask(cell.model, cell.temperature, prompt::STUDY1, &vars, "generation")
            .await?;
        let record = GenerationRecord::new(GenerationCondition::from(cell), response, cell.repeat);
        corpus.write(&record, false)?;
        Ok(Outcome::Saved { latency_ms })
    }

    // ------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------

    /// Run every prediction task and persist its result
    pub async fn predict<S: KeyValueStore>(
        &self,
        stage: &str,
        store: &ResultStore<S>,
        tasks: Vec<PredictionTask>,
    ) -> RunCounts {
        self.start(stage, tasks.len());
        let mut counts = RunCounts::default();
        for task in tasks {
            let label = condition_label(&task.condition);
            let outcome = self.predict_one(store, task).await;
            self.tally(stage, &label, outcome, &mut counts);
        }
        self.finish(stage, counts)
    }

    async fn predict_one<S: KeyValueStore>(
        &self,
        store: &ResultStore<S>,
        task: PredictionTask,
    ) -> Result<Outcome, ExecutionError> {
        let key = store.path_for(&task.condition)?;
        if self.skip_existing && store.exists(&key)? {
            return Ok(Outcome::Skipped);
        }
        let vars: Vec<(&str, &str)> = task.vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let (response, latency_ms): (PredictionResponse, u64) = self
            .ask(
                task.condition.predictor_model_id,
                JUDGE_TEMPERATURE,
                task.template,
                &vars,
                "prediction",
            )
            .await?;
        let result = ExperimentalResult::new(
            task.condition,
            task.sentence,
            response.reasoning,
            response.judgment,
            latency_ms,
        );
        store.write(&result, false)?;
        Ok(Outcome::Saved { latency_ms })
    }

    /// Persist results that need no model call
    pub fn store_results<S: KeyValueStore>(
        &self,
        stage: &str,
        store: &ResultStore<S>,
        results: Vec<ExperimentalResult>,
    ) -> RunCounts {
        self.start(stage, results.len());
        let mut counts = RunCounts::default();
        for result in results {
            let label = condition_label(&result.condition);
            let outcome = store
                .write(&result, self.skip_existing)
                .map(|written| {
                    if written {
                        Outcome::Saved { latency_ms: 0 }
                    } else {
                        Outcome::Skipped
                    }
                })
                .map_err(ExecutionError::from);
            self.tally(stage, &label, outcome, &mut counts);
        }
        self.finish(stage, counts)
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Ask `editor` for Info+/Info− rewrites of each sample
    pub async fn edit<S: KeyValueStore>(
        &self,
        stage: &str,
        store: &EditedPairStore<S>,
        editor: ModelId,
        samples: &[SourceSample],
    ) -> RunCounts {
        self.start(stage, samples.len());
        let mut counts = RunCounts::default();
        for sample in samples {
            let label = format!("{}/{}", sample.generator.name(), sample.source_id);
            let outcome = self.edit_one(store, editor, sample).await;
            self.tally(stage, &label, outcome, &mut counts);
        }
        self.finish(stage, counts)
    }

    async fn edit_one<S: KeyValueStore>(
        &self,
        store: &EditedPairStore<S>,
        editor: ModelId,
        sample: &SourceSample,
    ) -> Result<Outcome, ExecutionError> {
        let key = store.path_for(sample.generator, &sample.source_id)?;
        if self.skip_existing && store.exists(&key)? {
            return Ok(Outcome::Skipped);
        }
        let vars = [("generated_sentence", sample.text.as_str())];
        let (edit, latency_ms): (EditResponse, u64) = self
            .ask(editor, JUDGE_TEMPERATURE, prompt::EDIT, &vars, "edit")
            .await?;
        store.write(&EditedPair::new(sample, edit), false)?;
        Ok(Outcome::Saved { latency_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConditionKind, Judgment, Topic};
    use crate::llm::MockInvoker;
    use crate::prompt::PromptLibrary;
    use crate::store::{MemoryStore, Scope};
    use std::collections::BTreeMap;

    fn sample(id: &str) -> SourceSample {
        SourceSample {
            source_id: id.to_string(),
            generator: ModelId::GptOss20b,
            prompt_style: PromptStyle::Absurd,
            topic: Topic::Elephant,
            temperature: 0.9,
            loop_index: 0,
            text: "Elephants juggle moons.".to_string(),
            source_reasoning: "wild".to_string(),
            source_label: Judgment::High,
            expected: Judgment::High,
        }
    }

    fn task(id: &str) -> PredictionTask {
        let s = sample(id);
        PredictionTask::labelled(
            s.condition(ConditionKind::WithinModel, ModelId::GptOss20b),
            s.text.clone(),
            s.prompt_style,
        )
    }

    const HIGH: &str = r#"{"reasoning": "odd", "judgment": "HIGH"}"#;

    #[tokio::test]
    async fn test_predict_saves_then_skips() {
        let invoker = MockInvoker::always(HIGH);
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        let executor = Executor::new(&invoker, &prompts, EventBus::default());

        let counts = executor.predict("study2", &store, vec![task("a"), task("b")]).await;
        assert_eq!(counts, RunCounts { saved: 2, skipped: 0, failed: 0 });

        let counts = executor.predict("study2", &store, vec![task("a"), task("b")]).await;
        assert_eq!(counts, RunCounts { saved: 0, skipped: 2, failed: 0 });
        assert_eq!(invoker.call_count(), 2);

        let results = store.load(Scope::All).unwrap().results;
        assert!(results.iter().all(|r| r.is_correct));
    }

    #[tokio::test]
    async fn test_force_reruns_existing() {
        let invoker = MockInvoker::always(HIGH);
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        let executor = Executor::new(&invoker, &prompts, EventBus::default());
        executor.predict("study2", &store, vec![task("a")]).await;

        let forced = Executor::new(&invoker, &prompts, EventBus::default()).with_skip_existing(false);
        let counts = forced.predict("study2", &store, vec![task("a")]).await;
        assert_eq!(counts.saved, 1);
        assert_eq!(invoker.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_counted_and_batch_continues() {
        let invoker = MockInvoker::new(vec![
            Err(LlmError::Timeout),
            Ok("not json at all".to_string()),
            Ok(HIGH.to_string()),
        ]);
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let executor = Executor::new(&invoker, &prompts, bus);

        let counts = executor
            .predict("study2", &store, vec![task("a"), task("b"), task("c")])
            .await;
        assert_eq!(counts, RunCounts { saved: 1, skipped: 0, failed: 2 });
        assert_eq!(store.load(Scope::All).unwrap().len(), 1);

        let mut failed_keys = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ExperimentEvent::ConditionFailed { key, .. } = event {
                failed_keys.push(key);
            }
        }
        assert_eq!(
            failed_keys,
            vec![
                "within_model/GPT_OSS_20B/GPT_OSS_20B/a".to_string(),
                "within_model/GPT_OSS_20B/GPT_OSS_20B/b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_predictor_runs_at_zero_temperature() {
        let invoker = MockInvoker::always(HIGH);
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        Executor::new(&invoker, &prompts, EventBus::default())
            .predict("study2", &store, vec![task("a")])
            .await;
        let calls = invoker.calls();
        assert_eq!(calls[0].temperature, 0.0);
        assert!(calls[0].prompt.contains("Elephants juggle moons."));
        assert!(calls[0].schema.is_some());
    }

    #[tokio::test]
    async fn test_missing_template_fails_condition() {
        let invoker = MockInvoker::always(HIGH);
        let prompts = PromptLibrary::new().with_template(prompt::PREDICTION, "{{ nope }}");
        let store = ResultStore::new(MemoryStore::new());
        let counts = Executor::new(&invoker, &prompts, EventBus::default())
            .predict("study2", &store, vec![task("a")])
            .await;
        assert_eq!(counts.failed, 1);
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_writes_corpus() {
        let invoker = MockInvoker::always(
            r#"{"generated_sentence": "Murlocs sing.", "reasoning": "r", "judgment": "LOW"}"#,
        );
        let prompts = PromptLibrary::new();
        let corpus = Study1Corpus::new(MemoryStore::new());
        let cells = crate::core::ConditionMatrix::default()
            .with_models(vec![ModelId::GptOss20b])
            .with_temperatures(vec![0.0, 1.0])
            .with_repeats(1);
        let executor = Executor::new(&invoker, &prompts, EventBus::default());

        let counts = executor.generate("study1", &corpus, cells.cells()).await;
        assert_eq!(counts.saved, cells.len());
        let calls = invoker.calls();
        assert!(calls.iter().any(|c| c.temperature == 1.0));

        let (records, corrupt) = corpus.records().unwrap();
        assert_eq!(records.len(), cells.len());
        assert_eq!(corrupt, 0);

        let again = executor.generate("study1", &corpus, cells.cells()).await;
        assert_eq!(again.skipped, cells.len());
    }

    #[tokio::test]
    async fn test_edit_stores_pairs() {
        let invoker =
            MockInvoker::always(r#"{"info_plus": "long version", "info_minus": "short"}"#);
        let prompts = PromptLibrary::new();
        let store = EditedPairStore::new(MemoryStore::new());
        let counts = Executor::new(&invoker, &prompts, EventBus::default())
            .edit("experiment_a_edit", &store, ModelId::Nova2Lite, &[sample("x")])
            .await;
        assert_eq!(counts.saved, 1);
        assert_eq!(invoker.calls()[0].model, ModelId::Nova2Lite);

        let (pairs, _) = store.load_all().unwrap();
        assert_eq!(pairs[0].info_plus, "long version");
        assert_eq!(pairs[0].original_sentence, "Elephants juggle moons.");
    }

    #[test]
    fn test_store_results_respects_skip() {
        let invoker = MockInvoker::default();
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        let executor = Executor::new(&invoker, &prompts, EventBus::default());
        let s = sample("a");
        let result = ExperimentalResult::new(
            s.condition(ConditionKind::SelfReflection, s.generator),
            s.text.clone(),
            s.source_reasoning.clone(),
            s.source_label,
            0,
        );
        assert_eq!(executor.store_results("study2", &store, vec![result.clone()]).saved, 1);
        assert_eq!(executor.store_results("study2", &store, vec![result]).skipped, 1);
    }

    /// Warn-level events seen by a subscriber installed for the closure
    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<BTreeMap<String, String>>) {
        use tracing_subscriber::layer::SubscriberExt as _;

        let capture = WarnCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let out = tracing::subscriber::with_default(subscriber, f);
        let events = capture.events.lock().unwrap().clone();
        (out, events)
    }

    #[derive(Clone, Default)]
    struct WarnCapture {
        events: std::sync::Arc<std::sync::Mutex<Vec<BTreeMap<String, String>>>>,
    }

    struct Fields<'a>(&'a mut BTreeMap<String, String>);

    impl tracing::field::Visit for Fields<'_> {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() != tracing::Level::WARN {
                return;
            }
            let mut fields = BTreeMap::new();
            event.record(&mut Fields(&mut fields));
            self.events.lock().unwrap().push(fields);
        }
    }

    #[test]
    fn test_failure_logged_without_observer() {
        let invoker = MockInvoker::default();
        let prompts = PromptLibrary::new();
        let store = ResultStore::new(MemoryStore::new());
        // Capacity 1 and nobody subscribed: the event alone would be lost
        let executor = Executor::new(&invoker, &prompts, EventBus::new(1));
        let s = sample("a/b");
        let bad = ExperimentalResult::new(
            s.condition(ConditionKind::SelfReflection, s.generator),
            s.text.clone(),
            s.source_reasoning.clone(),
            s.source_label,
            0,
        );

        let (counts, warnings) =
            capture_warnings(|| executor.store_results("study2/self_reflection", &store, vec![bad]));
        assert_eq!(counts.failed, 1);
        let failure = warnings
            .iter()
            .find(|w| w.get("message").is_some_and(|m| m == "Condition failed"))
            .expect("no failure warning");
        assert_eq!(
            failure.get("condition").map(String::as_str),
            Some("self_reflection/GPT_OSS_20B/GPT_OSS_20B/a/b")
        );
        assert_eq!(failure.get("stage").map(String::as_str), Some("study2/self_reflection"));
        assert!(failure.get("error").is_some_and(|e| e.contains("path separator")));
    }

    #[test]
    fn test_run_counts_display_and_merge() {
        let mut counts = RunCounts { saved: 1, skipped: 2, failed: 0 };
        counts.merge(RunCounts { saved: 3, skipped: 0, failed: 1 });
        assert_eq!(counts.to_string(), "saved=4 skipped=2 failed=1");
        assert_eq!(counts.total(), 7);
    }
}
