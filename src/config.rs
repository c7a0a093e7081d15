//! Run configuration
//!
//! [`EnvConfig`] holds provider endpoints and credentials read from the
//! environment. [`ExperimentConfig`] holds the per-run settings assembled from
//! CLI flags. Both are validated up front so a run never starts with a
//! configuration problem; every problem is reported, not just the first.

use crate::core::{parse_model_list, ModelId, ProviderKind, Thresholds};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LM_STUDIO_BASE_URL: &str = "http://127.0.0.1:1234/v1";
pub const DEFAULT_BEDROCK_BASE_URL: &str =
    "https://bedrock-runtime.us-east-1.amazonaws.com/openai/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Configuration problems, all collected before any work starts
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ConfigError {
    pub fn new(problems: Vec<String>) -> Self {
        Self { problems }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.problems.join("; "))
    }
}

impl std::error::Error for ConfigError {}

/// Provider endpoints and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub lm_studio_base_url: String,
    pub lm_studio_api_key: Option<String>,
    pub bedrock_base_url: String,
    pub bedrock_api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            lm_studio_base_url: DEFAULT_LM_STUDIO_BASE_URL.to_string(),
            lm_studio_api_key: None,
            bedrock_base_url: DEFAULT_BEDROCK_BASE_URL.to_string(),
            bedrock_api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl EnvConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through an arbitrary lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        let mut problems = Vec::new();

        let timeout = match get("LLM_TIMEOUT_SECS") {
            None => defaults.timeout,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    problems.push(format!(
                        "LLM_TIMEOUT_SECS must be a positive integer, got '{}'",
                        raw
                    ));
                    defaults.timeout
                }
            },
        };

        let max_retries = match get("LLM_MAX_RETRIES") {
            None => defaults.max_retries,
            Some(raw) => raw.trim().parse::<usize>().unwrap_or_else(|_| {
                problems.push(format!(
                    "LLM_MAX_RETRIES must be a non-negative integer, got '{}'",
                    raw
                ));
                defaults.max_retries
            }),
        };

        if !problems.is_empty() {
            return Err(ConfigError::new(problems));
        }

        Ok(Self {
            lm_studio_base_url: get("LM_STUDIO_BASE_URL").unwrap_or(defaults.lm_studio_base_url),
            lm_studio_api_key: get("LM_STUDIO_API_KEY"),
            bedrock_base_url: get("BEDROCK_BASE_URL").unwrap_or(defaults.bedrock_base_url),
            bedrock_api_key: get("BEDROCK_API_KEY").or_else(|| get("AWS_BEARER_TOKEN_BEDROCK")),
            timeout,
            max_retries,
        })
    }

    /// Whether requests to `provider` can be authenticated
    pub fn has_credentials(&self, provider: ProviderKind) -> bool {
        match provider {
            // LM Studio accepts unauthenticated requests
            ProviderKind::LmStudio => true,
            ProviderKind::AwsBedrock => self.bedrock_api_key.is_some(),
        }
    }
}

/// Raw per-run settings as given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub low_max: f64,
    pub high_min: f64,
    pub study1_dir: PathBuf,
    pub output_dir: PathBuf,
    pub generator_models: Option<String>,
    pub predictor_models: Option<String>,
    pub limit_samples: Option<usize>,
    pub force: bool,
    pub prompts_dir: Option<PathBuf>,
}

/// Validated per-run settings
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub thresholds: Thresholds,
    pub study1_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Generator allow-list; `None` accepts every generator in the corpus
    pub generators: Option<Vec<ModelId>>,
    /// Predictors; empty means "the generators of the loaded candidates"
    pub predictors: Vec<ModelId>,
    pub limit_samples: Option<usize>,
    /// Re-run conditions whose results already exist
    pub force: bool,
    pub prompts_dir: Option<PathBuf>,
}

impl ExperimentConfig {
    /// Parse and validate settings, reporting every problem at once
    ///
    /// `default_predictors` is used when no predictor list is given.
    pub fn from_settings(
        settings: RunSettings,
        default_predictors: &[ModelId],
    ) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();

        let thresholds = Thresholds::new(settings.low_max, settings.high_min)
            .map_err(|e| problems.push(e.to_string()))
            .ok();

        let mut parse_list = |flag: &str, value: Option<&str>| -> Option<Vec<ModelId>> {
            let value = value?;
            match parse_model_list(value) {
                Ok(models) if models.is_empty() => {
                    problems.push(format!("--{} lists no models", flag));
                    None
                }
                Ok(models) => Some(models),
                Err(e) => {
                    problems.push(format!("--{}: {}", flag, e));
                    None
                }
            }
        };
        let generators = parse_list("generator-models", settings.generator_models.as_deref());
        let predictors = parse_list("predictor-models", settings.predictor_models.as_deref())
            .unwrap_or_else(|| default_predictors.to_vec());

        if settings.limit_samples == Some(0) {
            problems.push("--limit-samples must be at least 1".to_string());
        }
        if let Some(dir) = &settings.prompts_dir {
            if !dir.is_dir() {
                problems.push(format!("--prompts-dir '{}' is not a directory", dir.display()));
            }
        }

        match thresholds {
            Some(thresholds) if problems.is_empty() => Ok(Self {
                thresholds,
                study1_dir: settings.study1_dir,
                output_dir: settings.output_dir,
                generators,
                predictors,
                limit_samples: settings.limit_samples,
                force: settings.force,
                prompts_dir: settings.prompts_dir,
            }),
            _ => Err(ConfigError::new(problems)),
        }
    }

    /// Check that every model this run may call can be reached
    pub fn validate(&self, env: &EnvConfig, extra_models: &[ModelId]) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut models: Vec<ModelId> = self.predictors.clone();
        models.extend_from_slice(extra_models);
        models.sort();
        models.dedup();

        let missing: Vec<&str> = models
            .iter()
            .filter(|m| !env.has_credentials(m.provider()))
            .map(|m| m.name())
            .collect();
        if !missing.is_empty() {
            errors.push(format!(
                "BEDROCK_API_KEY (or AWS_BEARER_TOKEN_BEDROCK) is required for {}",
                missing.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether existing results are skipped
    pub fn skip_existing(&self) -> bool {
        !self.force
    }

    /// Predictors for a run over samples from `generators`
    pub fn predictors_for(&self, generators: &[ModelId]) -> Vec<ModelId> {
        if self.predictors.is_empty() {
            generators.to_vec()
        } else {
            self.predictors.clone()
        }
    }
}
