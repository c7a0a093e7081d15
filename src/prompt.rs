//! Prompt templates
//!
//! Templates are plain text with `{{ variable }}` placeholders. Built-in
//! templates ship with the crate; a template directory, when given, overrides
//! them by file name (`{name}.txt`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stage-1 generation
pub const STUDY1: &str = "study1";
/// Prediction with prompt style and topic shown
pub const PREDICTION: &str = "study2_prediction";
/// Prediction from the sentence alone
pub const PREDICTION_BLIND: &str = "study2_prediction_blind";
/// Info+/Info− rewrite
pub const EDIT: &str = "experiment_a_edit";

const BUILTIN: [(&str, &str); 4] = [
    (STUDY1, include_str!("../prompts/study1.txt")),
    (PREDICTION, include_str!("../prompts/study2_prediction.txt")),
    (PREDICTION_BLIND, include_str!("../prompts/study2_prediction_blind.txt")),
    (EDIT, include_str!("../prompts/experiment_a_edit.txt")),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// No template with this name
    NotFound { name: String },
    /// Template file exists but could not be read
    Unreadable { path: PathBuf, message: String },
    /// A placeholder has no value
    MissingVariable { template: String, variable: String },
    /// `{{` without a closing `}}`
    Unterminated { template: String },
}

impl std::fmt::Display for PromptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptError::NotFound { name } => write!(f, "prompt template '{}' not found", name),
            PromptError::Unreadable { path, message } => {
                write!(f, "failed to read prompt '{}': {}", path.display(), message)
            }
            PromptError::MissingVariable { template, variable } => write!(
                f,
                "prompt '{}' references unknown variable '{}'",
                template, variable
            ),
            PromptError::Unterminated { template } => {
                write!(f, "prompt '{}' has an unterminated placeholder", template)
            }
        }
    }
}

impl std::error::Error for PromptError {}

/// Renders a named template with variables
pub trait PromptRenderer: Send + Sync {
    fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError>;
}

/// Built-in templates with optional on-disk overrides
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    dir: Option<PathBuf>,
    inline: HashMap<String, String>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer `{dir}/{name}.txt` over built-in templates
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Register a template in memory, taking precedence over every other source
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.inline.insert(name.into(), body.into());
        self
    }

    fn from_dir(dir: &Path, name: &str) -> Result<Option<String>, PromptError> {
        let path = dir.join(format!("{}.txt", name));
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PromptError::Unreadable {
                path,
                message: e.to_string(),
            }),
        }
    }

    /// Template body by name
    pub fn template(&self, name: &str) -> Result<String, PromptError> {
        if let Some(body) = self.inline.get(name) {
            return Ok(body.clone());
        }
        if let Some(dir) = &self.dir {
            if let Some(body) = Self::from_dir(dir, name)? {
                return Ok(body);
            }
        }
        BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, body)| body.to_string())
            .ok_or_else(|| PromptError::NotFound {
                name: name.to_string(),
            })
    }
}

impl PromptRenderer for PromptLibrary {
    fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self.template(name)?;
        substitute(name, &template, vars)
    }
}

/// Replace every `{{ variable }}` in `template`
pub fn substitute(name: &str, template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find("}}").ok_or_else(|| PromptError::Unterminated {
            template: name.to_string(),
        })?;
        let variable = after[..close].trim();
        let value = vars
            .iter()
            .find(|(key, _)| *key == variable)
            .map(|(_, value)| *value)
            .ok_or_else(|| PromptError::MissingVariable {
                template: name.to_string(),
                variable: variable.to_string(),
            })?;
        out.push_str(value);
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
