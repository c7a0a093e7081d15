//! Structured responses
//!
//! Models are asked for JSON matching a schema derived with `schemars`. Local
//! models do not always honour the response format, so parsing also accepts a
//! fenced code block or JSON embedded in surrounding prose.

use crate::llm::{LlmError, ResponseSchema};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

/// Schema of `T`, named for the response format
pub fn response_schema<T: JsonSchema>(name: &str) -> ResponseSchema {
    ResponseSchema {
        name: name.to_string(),
        schema: serde_json::Value::from(schemars::schema_for!(T)),
    }
}

/// Parse a structured reply
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let candidate = strip_fence(trimmed).or_else(|| outermost_object(trimmed));
    match candidate {
        Some(json) => serde_json::from_str(json).map_err(|e| {
            LlmError::InvalidResponse(format!("structured response did not parse: {}", e))
        }),
        None => Err(LlmError::InvalidResponse(
            "response contains no JSON object".to_string(),
        )),
    }
}

fn strip_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
