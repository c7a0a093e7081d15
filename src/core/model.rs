//! Identifiers shared by every experiment stage
//!
//! Models, prompt styles, topics, judgments and condition kinds are closed
//! enums. Each carries two spellings:
//!
//! - a **name** (`QWEN3_CODER_30B`, `FACTUAL`) used in storage paths and on the CLI
//! - a **value** (`qwen/qwen3-coder-30b`, `factual`) used on the wire and in records

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error returned when an identifier cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// What kind of identifier was being parsed ("model", "prompt style", ...)
    pub kind: &'static str,
    /// The rejected input
    pub input: String,
    /// Accepted names, comma separated
    pub available: String,
}

impl std::fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown {} name: {}. Available: {}",
            self.kind, self.input, self.available
        )
    }
}

impl std::error::Error for ParseIdError {}

/// API family a model is served through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    /// Local LM Studio server (OpenAI-compatible)
    LmStudio,
    /// Amazon Bedrock (OpenAI-compatible endpoint)
    AwsBedrock,
}

impl ProviderKind {
    /// Stable name used in logs and configuration
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::LmStudio => "LM_STUDIO",
            ProviderKind::AwsBedrock => "AWS_BEDROCK",
        }
    }
}

/// Models taking part in the study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "qwen/qwen3-coder-30b")]
    Qwen3Coder30b,
    #[serde(rename = "google/gemma-3n-e4b")]
    Gemma3nE4b,
    #[serde(rename = "openai/gpt-oss-20b")]
    GptOss20b,
    #[serde(rename = "mistralai/magistral-small-2509")]
    MagistralSmall,
    #[serde(rename = "ibm/granite-4-h-tiny")]
    IbmGranite4Tiny,
    #[serde(rename = "mistralai/devstral-small-2507")]
    Devstral,
    #[serde(rename = "amazon.nova-micro-v1:0")]
    NovaMicro,
    #[serde(rename = "global.amazon.nova-2-lite-v1:0")]
    Nova2Lite,
    #[serde(rename = "anthropic.claude-haiku-4-5-20251001-v1:0")]
    ClaudeHaiku45,
}

impl ModelId {
    /// Every model, in declaration order
    pub const ALL: [ModelId; 9] = [
        ModelId::Qwen3Coder30b,
        ModelId::Gemma3nE4b,
        ModelId::GptOss20b,
        ModelId::MagistralSmall,
        ModelId::IbmGranite4Tiny,
        ModelId::Devstral,
        ModelId::NovaMicro,
        ModelId::Nova2Lite,
        ModelId::ClaudeHaiku45,
    ];

    /// Enum-style name used in storage paths and CLI arguments
    pub fn name(self) -> &'static str {
        match self {
            ModelId::Qwen3Coder30b => "QWEN3_CODER_30B",
            ModelId::Gemma3nE4b => "GEMMA_3N_E4B",
            ModelId::GptOss20b => "GPT_OSS_20B",
            ModelId::MagistralSmall => "MAGISTRAL_SMALL",
            ModelId::IbmGranite4Tiny => "IBM_GRANITE4_TINY",
            ModelId::Devstral => "DEVSTRAL",
            ModelId::NovaMicro => "NOVA_MICRO",
            ModelId::Nova2Lite => "NOVA_2_LITE",
            ModelId::ClaudeHaiku45 => "CLAUDE_HAIKU_4_5",
        }
    }

    /// Provider-side model identifier sent in API requests
    pub fn api_id(self) -> &'static str {
        match self {
            ModelId::Qwen3Coder30b => "qwen/qwen3-coder-30b",
            ModelId::Gemma3nE4b => "google/gemma-3n-e4b",
            ModelId::GptOss20b => "openai/gpt-oss-20b",
            ModelId::MagistralSmall => "mistralai/magistral-small-2509",
            ModelId::IbmGranite4Tiny => "ibm/granite-4-h-tiny",
            ModelId::Devstral => "mistralai/devstral-small-2507",
            ModelId::NovaMicro => "amazon.nova-micro-v1:0",
            ModelId::Nova2Lite => "global.amazon.nova-2-lite-v1:0",
            ModelId::ClaudeHaiku45 => "anthropic.claude-haiku-4-5-20251001-v1:0",
        }
    }

    /// Provider family serving this model
    pub fn provider(self) -> ProviderKind {
        match self {
            ModelId::Qwen3Coder30b
            | ModelId::Gemma3nE4b
            | ModelId::GptOss20b
            | ModelId::MagistralSmall
            | ModelId::IbmGranite4Tiny
            | ModelId::Devstral => ProviderKind::LmStudio,
            ModelId::NovaMicro | ModelId::Nova2Lite | ModelId::ClaudeHaiku45 => {
                ProviderKind::AwsBedrock
            }
        }
    }

    /// Look up a model by its storage name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    /// Comma-separated list of every model name, for error messages
    pub fn available_names() -> String {
        Self::ALL
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelId {
    type Err = ParseIdError;

    /// Accepts the enum name (case-insensitive) or the provider identifier
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(trimmed) || m.api_id() == trimmed)
            .ok_or_else(|| ParseIdError {
                kind: "model",
                input: trimmed.to_string(),
                available: Self::available_names(),
            })
    }
}

/// Parse a comma-separated model list, ignoring empty items
pub fn parse_model_list(value: &str) -> Result<Vec<ModelId>, ParseIdError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ModelId::from_str)
        .collect()
}

/// Prompt style (mode) the sentence was generated under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    Factual,
    Normal,
    Absurd,
}

impl PromptStyle {
    pub const ALL: [PromptStyle; 3] = [PromptStyle::Factual, PromptStyle::Normal, PromptStyle::Absurd];

    pub fn name(self) -> &'static str {
        match self {
            PromptStyle::Factual => "FACTUAL",
            PromptStyle::Normal => "NORMAL",
            PromptStyle::Absurd => "ABSURD",
        }
    }

    pub fn value(self) -> &'static str {
        match self {
            PromptStyle::Factual => "factual",
            PromptStyle::Normal => "normal",
            PromptStyle::Absurd => "absurd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// Style shown to the predictor in the wrong-label arm
    ///
    /// FACTUAL and ABSURD are exchanged. NORMAL has no counterpart and yields
    /// `None`, which removes the sample from that arm.
    pub fn swapped(self) -> Option<Self> {
        match self {
            PromptStyle::Factual => Some(PromptStyle::Absurd),
            PromptStyle::Absurd => Some(PromptStyle::Factual),
            PromptStyle::Normal => None,
        }
    }
}

/// Subject the generated sentence is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "elephant")]
    Elephant,
    #[serde(rename = "unicorn")]
    Unicorn,
    #[serde(rename = "murloc")]
    Murloc,
    #[serde(rename = "adele-dokodoko-yattaze-penguin")]
    AdeleDokodokoYattazePenguin,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::Elephant,
        Topic::Unicorn,
        Topic::Murloc,
        Topic::AdeleDokodokoYattazePenguin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::Elephant => "ELEPHANT",
            Topic::Unicorn => "UNICORN",
            Topic::Murloc => "MURLOC",
            Topic::AdeleDokodokoYattazePenguin => "ADELE_DOKODOKO_YATTAZE_PENGUIN",
        }
    }

    pub fn value(self) -> &'static str {
        match self {
            Topic::Elephant => "elephant",
            Topic::Unicorn => "unicorn",
            Topic::Murloc => "murloc",
            Topic::AdeleDokodokoYattazePenguin => "adele-dokodoko-yattaze-penguin",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Binary temperature label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
pub enum Judgment {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "LOW")]
    Low,
}

impl Judgment {
    pub fn as_str(self) -> &'static str {
        match self {
            Judgment::High => "HIGH",
            Judgment::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experimental arm a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    SelfReflection,
    WithinModel,
    AcrossModel,
    Blind,
    WrongLabel,
    InfoPlus,
    InfoMinus,
}

impl ConditionKind {
    /// Fixed presentation order
    pub const ORDER: [ConditionKind; 7] = [
        ConditionKind::SelfReflection,
        ConditionKind::WithinModel,
        ConditionKind::AcrossModel,
        ConditionKind::Blind,
        ConditionKind::WrongLabel,
        ConditionKind::InfoPlus,
        ConditionKind::InfoMinus,
    ];

    /// Storage segment and table label
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::SelfReflection => "self_reflection",
            ConditionKind::WithinModel => "within_model",
            ConditionKind::AcrossModel => "across_model",
            ConditionKind::Blind => "blind",
            ConditionKind::WrongLabel => "wrong_label",
            ConditionKind::InfoPlus => "info_plus",
            ConditionKind::InfoMinus => "info_minus",
        }
    }

    /// Position in [`ConditionKind::ORDER`]
    pub fn ordinal(self) -> usize {
        Self::ORDER
            .iter()
            .position(|k| *k == self)
            .unwrap_or(Self::ORDER.len())
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
