//! Persisted record types
//!
//! Every record is written once by the stage that produced it and is read-only
//! afterwards. Re-running a stage either skips a record that already exists or
//! replaces it wholesale.

use crate::core::matrix::GenerationCell;
use crate::core::model::{ConditionKind, Judgment, ModelId, PromptStyle, Topic};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Current time as RFC 3339, the timestamp format of every record
pub fn now_rfc3339() -> String {
    humantime::format_rfc3339(SystemTime::now()).to_string()
}

/// Temperature as it appears in stage-1 file names (`0.0`, `0.3`, `1.25`)
pub fn format_temperature(temperature: f64) -> String {
    if temperature.fract() == 0.0 {
        format!("{:.1}", temperature)
    } else {
        format!("{}", temperature)
    }
}

// ============================================================================
// Structured LLM responses
// ============================================================================

/// Stage-1 generation response: a sentence plus the model's own guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResponse {
    /// Sentence generated for the requested topic and style
    pub generated_sentence: String,
    /// Reasoning about whether the temperature was HIGH or LOW
    pub reasoning: String,
    /// Final HIGH / LOW judgment
    pub judgment: Judgment,
}

/// Predictor response for every prediction arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PredictionResponse {
    /// Reasoning about the temperature behind the sentence
    pub reasoning: String,
    /// Final HIGH / LOW judgment
    pub judgment: Judgment,
}

/// Editor response for the information-density experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditResponse {
    /// Same content rewritten with more detail
    pub info_plus: String,
    /// Same content rewritten with less detail
    pub info_minus: String,
}

// ============================================================================
// Stage 1
// ============================================================================

/// Factors a stage-1 sentence was generated under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationCondition {
    pub model_id: ModelId,
    pub temperature: f64,
    pub prompt_type: PromptStyle,
    pub target: Topic,
}

impl From<&GenerationCell> for GenerationCondition {
    fn from(cell: &GenerationCell) -> Self {
        Self {
            model_id: cell.model,
            temperature: cell.temperature,
            prompt_type: cell.prompt_style,
            target: cell.topic,
        }
    }
}

/// A stage-1 record as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub condition: GenerationCondition,
    pub response: GenerationResponse,
    #[serde(default)]
    pub loop_times: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl GenerationRecord {
    /// Fresh record with a new unique id
    pub fn new(condition: GenerationCondition, response: GenerationResponse, loop_times: u32) -> Self {
        Self {
            condition,
            response,
            loop_times,
            unique_id: Some(uuid::Uuid::new_v4().to_string()),
            created_at: Some(now_rfc3339()),
        }
    }

    /// Identity used to join this sample across every downstream arm
    ///
    /// Records without a stored `unique_id` get one derived from all factors
    /// that make up their storage location.
    pub fn source_id(&self) -> String {
        match &self.unique_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => format!(
                "{}__{}__{}__temp_{}_loop_{}",
                self.condition.model_id.name(),
                self.condition.target.name(),
                self.condition.prompt_type.name(),
                format_temperature(self.condition.temperature),
                self.loop_times
            ),
        }
    }
}

/// A stage-1 sample accepted as a candidate for downstream arms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSample {
    pub source_id: String,
    pub generator: ModelId,
    pub prompt_style: PromptStyle,
    pub topic: Topic,
    pub temperature: f64,
    pub loop_index: u32,
    pub text: String,
    pub source_reasoning: String,
    pub source_label: Judgment,
    /// Derived from `temperature` once, when the sample is loaded
    pub expected: Judgment,
}

impl SourceSample {
    /// Condition for this sample in a given arm
    pub fn condition(&self, kind: ConditionKind, predictor: ModelId) -> ExperimentalCondition {
        ExperimentalCondition {
            condition_type: kind,
            generator_model_id: self.generator,
            predictor_model_id: predictor,
            temperature: self.temperature,
            expected_judgment: self.expected,
            prompt_type: self.prompt_style,
            target: self.topic,
            source_loop_times: self.loop_index,
            source_unique_id: self.source_id.clone(),
        }
    }
}

// ============================================================================
// Downstream arms
// ============================================================================

/// Immutable identity of one executed prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalCondition {
    pub condition_type: ConditionKind,
    pub generator_model_id: ModelId,
    pub predictor_model_id: ModelId,
    pub temperature: f64,
    pub expected_judgment: Judgment,
    pub prompt_type: PromptStyle,
    pub target: Topic,
    #[serde(default)]
    pub source_loop_times: u32,
    pub source_unique_id: String,
}

/// Outcome of one prediction, stored under its condition's key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalResult {
    pub condition: ExperimentalCondition,
    /// Sentence shown to the predictor
    pub generated_sentence: String,
    pub reasoning: String,
    pub predicted_judgment: Judgment,
    pub is_correct: bool,
    pub processing_time_ms: u64,
    pub created_at: String,
    pub unique_id: String,
}

impl ExperimentalResult {
    /// Build a result, deriving `is_correct` from the labels
    pub fn new(
        condition: ExperimentalCondition,
        generated_sentence: impl Into<String>,
        reasoning: impl Into<String>,
        predicted_judgment: Judgment,
        processing_time_ms: u64,
    ) -> Self {
        let is_correct = predicted_judgment == condition.expected_judgment;
        Self {
            condition,
            generated_sentence: generated_sentence.into(),
            reasoning: reasoning.into(),
            predicted_judgment,
            is_correct,
            processing_time_ms,
            created_at: now_rfc3339(),
            unique_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Whether the stored `is_correct` agrees with the labels
    pub fn is_consistent(&self) -> bool {
        self.is_correct == (self.predicted_judgment == self.condition.expected_judgment)
    }

    pub fn is_high(&self) -> bool {
        self.predicted_judgment == Judgment::High
    }

    pub fn source_id(&self) -> &str {
        &self.condition.source_unique_id
    }
}

/// Info+/Info− rewrite of a stage-1 sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditedPair {
    pub source_unique_id: String,
    pub generator_model: ModelId,
    pub prompt_type: PromptStyle,
    pub target: Topic,
    pub temperature: f64,
    pub expected_judgment: Judgment,
    #[serde(default)]
    pub loop_times: u32,
    pub original_sentence: String,
    pub info_plus: String,
    pub info_minus: String,
}

impl EditedPair {
    pub fn new(sample: &SourceSample, edit: EditResponse) -> Self {
        Self {
            source_unique_id: sample.source_id.clone(),
            generator_model: sample.generator,
            prompt_type: sample.prompt_style,
            target: sample.topic,
            temperature: sample.temperature,
            expected_judgment: sample.expected,
            loop_times: sample.loop_index,
            original_sentence: sample.text.clone(),
            info_plus: edit.info_plus,
            info_minus: edit.info_minus,
        }
    }

    /// Condition for one of the two variants
    pub fn condition(&self, kind: ConditionKind, predictor: ModelId) -> ExperimentalCondition {
        ExperimentalCondition {
            condition_type: kind,
            generator_model_id: self.generator_model,
            predictor_model_id: predictor,
            temperature: self.temperature,
            expected_judgment: self.expected_judgment,
            prompt_type: self.prompt_type,
            target: self.target,
            source_loop_times: self.loop_times,
            source_unique_id: self.source_unique_id.clone(),
        }
    }

    /// Sentence for a variant; `None` for kinds that are not Info+ or Info−
    pub fn variant_text(&self, kind: ConditionKind) -> Option<&str> {
        match kind {
            ConditionKind::InfoPlus => Some(self.info_plus.as_str()),
            ConditionKind::InfoMinus => Some(self.info_minus.as_str()),
            _ => None,
        }
    }
}
