//! Core experiment types
//!
//! - `model`: closed identifiers (models, styles, topics, judgments, condition kinds)
//! - `label`: temperature → LOW / HIGH ground truth
//! - `matrix`: stage-1 condition matrix
//! - `record`: persisted records and structured LLM responses

pub mod label;
pub mod matrix;
pub mod model;
pub mod record;

pub use label::{derive_label, ThresholdError, Thresholds, DEFAULT_HIGH_MIN, DEFAULT_LOW_MAX};
pub use matrix::{temperature_grid, ConditionMatrix, GenerationCell};
pub use model::{
    parse_model_list, ConditionKind, Judgment, ModelId, ParseIdError, PromptStyle, ProviderKind,
    Topic,
};
pub use record::{
    format_temperature, now_rfc3339, EditResponse, EditedPair, ExperimentalCondition,
    ExperimentalResult, GenerationCondition, GenerationRecord, GenerationResponse,
    PredictionResponse, SourceSample,
};
