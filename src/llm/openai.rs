//! OpenAI-compatible chat completions client
//!
//! Serves both LM Studio's local server and Bedrock's OpenAI-compatible
//! endpoint. When a request carries a [`ResponseSchema`] it is sent as a
//! `json_schema` response format.

use crate::llm::router::ClientConfig;
use crate::llm::{InvokeFuture, LlmError, LlmRequest, LlmResponse, ResponseSchema, TokenUsage};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ClientConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                    LlmError::InvalidResponse(format!("Invalid API key format: {}", e))
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::NetworkError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn complete(&self, request: LlmRequest) -> InvokeFuture<'_> {
        Box::pin(async move {
            let start = Instant::now();
            let body = ChatRequest::from(request);
            let url = format!("{}/chat/completions", self.base_url);

            let response = self
                .client
                .post(&url)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout
                    } else if e.is_connect() {
                        LlmError::NetworkError(format!("Connection failed: {}", e))
                    } else {
                        LlmError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(LlmError::RateLimited { retry_after });
            }

            if !status.is_success() {
                let message = response
                    .json::<ErrorResponse>()
                    .await
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(LlmError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat: ChatResponse = response.json().await.map_err(|e| {
                LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

            let content = chat
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| LlmError::InvalidResponse("Response has no content".to_string()))?;
            let tokens = chat
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default();

            Ok(LlmResponse {
                content,
                tokens,
                latency: start.elapsed(),
            })
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl From<LlmRequest> for ChatRequest {
    fn from(request: LlmRequest) -> Self {
        Self {
            model: request.model.api_id().to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            temperature: request.temperature,
            response_format: request.schema.map(ResponseFormat::from),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: serde_json::Value,
    strict: bool,
}

impl From<ResponseSchema> for ResponseFormat {
    fn from(schema: ResponseSchema) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: schema.name,
                schema: schema.schema,
                strict: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ModelId, ProviderKind};

    #[test]
    fn test_request_body_uses_api_id_and_schema() {
        let request = LlmRequest::new(ModelId::NovaMicro, 0.0, "hello").with_schema(ResponseSchema {
            name: "prediction".to_string(),
            schema: serde_json::json!({"type": "object"}),
        });
        let body = serde_json::to_value(ChatRequest::from(request)).unwrap();
        assert_eq!(body["model"], "amazon.nova-micro-v1:0");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "prediction");
    }

    #[test]
    fn test_request_body_without_schema() {
        let body =
            serde_json::to_value(ChatRequest::from(LlmRequest::new(ModelId::Devstral, 0.7, "x")))
                .unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["temperature"], 0.7);
    }

    #[test]
    fn test_response_without_usage_parses() {
        let raw = r#"{"choices":[{"message":{"content":"{}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ClientConfig {
            provider: ProviderKind::LmStudio,
            base_url: "http://localhost:1234/v1/".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            max_retries: 0,
        };
        let client = OpenAiCompatibleClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/v1");
    }
}
