//! LLM invocation
//!
//! Every experiment stage talks to models through the [`LlmInvoker`] trait.
//! The production invoker is [`ProviderRouter`], which picks an
//! OpenAI-compatible endpoint from the model's provider kind and retries
//! transient failures. Tests script responses with [`MockInvoker`].
//!
//! ```text
//! Executor → LlmInvoker → ProviderRouter → OpenAiCompatibleClient (LM Studio | Bedrock)
//! ```

pub mod openai;
pub mod retry;
pub mod router;
pub mod structured;

pub use openai::OpenAiCompatibleClient;
pub use retry::{call_with_retry, RetryConfig};
pub use router::{client_config, ClientConfig, ProviderRouter};
pub use structured::{parse_structured, response_schema};

use crate::core::ModelId;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Response from an LLM API call
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// Generated text content
    pub content: String,
    pub tokens: TokenUsage,
    /// API call latency
    pub latency: Duration,
}

impl LlmResponse {
    /// Response with only content, used by scripted invokers
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens: TokenUsage::default(),
            latency: Duration::ZERO,
        }
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub input: usize,
    pub output: usize,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> usize {
        self.input + self.output
    }
}

/// JSON schema the response must follow
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// One chat completion request
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: ModelId,
    pub temperature: f64,
    pub prompt: String,
    /// Requested structured output, sent as the response format
    pub schema: Option<ResponseSchema>,
}

impl LlmRequest {
    pub fn new(model: ModelId, temperature: f64, prompt: impl Into<String>) -> Self {
        Self {
            model,
            temperature,
            prompt: prompt.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Errors that can occur during LLM API calls
#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Rate limited by the API (429)
    RateLimited {
        /// Suggested retry delay from Retry-After header
        retry_after: Option<Duration>,
    },
    /// Request timed out
    Timeout,
    /// Network connectivity issue
    NetworkError(String),
    /// API returned an error response
    ApiError { status: u16, message: String },
    /// Response could not be parsed
    InvalidResponse(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::RateLimited { retry_after } => {
                if let Some(d) = retry_after {
                    write!(f, "Rate limited, retry after {:?}", d)
                } else {
                    write!(f, "Rate limited")
                }
            }
            LlmError::Timeout => write!(f, "Request timed out"),
            LlmError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LlmError::ApiError { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }
            LlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    /// Check if this error is retryable
    ///
    /// Retryable errors: RateLimited, Timeout, NetworkError, 5xx ApiErrors
    /// Non-retryable: 4xx ApiErrors (except 429), InvalidResponse
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Timeout => true,
            LlmError::NetworkError(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500 || *status == 429,
            LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Boxed future returned by [`LlmInvoker::invoke`]
pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>>;

/// Object-safe interface to a chat model
pub trait LlmInvoker: Send + Sync {
    /// Run one completion for `request.model` at `request.temperature`
    fn invoke(&self, request: LlmRequest) -> InvokeFuture<'_>;
}

/// Scripted invoker for tests and dry runs
///
/// Replies are consumed in call order; once the script is exhausted the
/// fallback reply (if any) is returned for every further call.
#[derive(Debug, Default)]
pub struct MockInvoker {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl MockInvoker {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Invoker that answers every call with `content`
    pub fn always(content: impl Into<String>) -> Self {
        Self {
            fallback: Some(content.into()),
            ..Self::default()
        }
    }

    /// Requests received so far, in call order
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl LlmInvoker for MockInvoker {
    fn invoke(&self, request: LlmRequest) -> InvokeFuture<'_> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let reply = match (next, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(LlmError::InvalidResponse("No more responses".to_string())),
        };
        Box::pin(async move { reply.map(LlmResponse::text) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_error_display_rate_limited() {
        let err = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(err.to_string().contains("Rate limited"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_error_display_api() {
        let err = LlmError::ApiError {
            status: 400,
            message: "Bad request".to_string(),
        };
        assert_eq!(err.to_string(), "API error 400: Bad request");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::NetworkError("x".to_string()).is_retryable());
        assert!(LlmError::ApiError { status: 503, message: String::new() }.is_retryable());
        assert!(!LlmError::ApiError { status: 401, message: String::new() }.is_retryable());
        assert!(!LlmError::InvalidResponse("x".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_mock_script_then_fallback() {
        let mock = MockInvoker {
            fallback: Some("fallback".to_string()),
            ..MockInvoker::new(vec![Ok("first".to_string()), Err(LlmError::Timeout)])
        };
        let req = LlmRequest::new(ModelId::NovaMicro, 0.0, "p");

        assert_eq!(mock.invoke(req.clone()).await.unwrap().content, "first");
        assert_eq!(mock.invoke(req.clone()).await.unwrap_err(), LlmError::Timeout);
        assert_eq!(mock.invoke(req).await.unwrap().content, "fallback");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_exhausted_errors() {
        let mock = MockInvoker::new(vec![]);
        let err = mock
            .invoke(LlmRequest::new(ModelId::Devstral, 0.5, "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert_eq!(mock.calls()[0].temperature, 0.5);
    }

    #[test]
    fn test_invoker_is_object_safe() {
        fn _accepts(_invoker: &dyn LlmInvoker) {}
        _accepts(&MockInvoker::always("x"));
    }
}
