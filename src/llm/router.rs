//! Provider routing

use crate::config::EnvConfig;
use crate::core::ProviderKind;
use crate::llm::{
    call_with_retry, InvokeFuture, LlmError, LlmInvoker, LlmRequest, OpenAiCompatibleClient,
    RetryConfig,
};
use std::time::Duration;

/// Connection settings of one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: usize,
}

/// Map a provider kind to its connection settings
pub fn client_config(provider: ProviderKind, env: &EnvConfig) -> ClientConfig {
    let (base_url, api_key) = match provider {
        ProviderKind::LmStudio => (&env.lm_studio_base_url, &env.lm_studio_api_key),
        ProviderKind::AwsBedrock => (&env.bedrock_base_url, &env.bedrock_api_key),
    };
    ClientConfig {
        provider,
        base_url: base_url.clone(),
        api_key: api_key.clone(),
        timeout: env.timeout,
        max_retries: env.max_retries,
    }
}

/// Invoker dispatching each request to the client of its model's provider
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    lm_studio: OpenAiCompatibleClient,
    bedrock: OpenAiCompatibleClient,
    retry: RetryConfig,
}

impl ProviderRouter {
    pub fn from_env(env: &EnvConfig) -> Result<Self, LlmError> {
        Ok(Self {
            lm_studio: OpenAiCompatibleClient::new(&client_config(ProviderKind::LmStudio, env))?,
            bedrock: OpenAiCompatibleClient::new(&client_config(ProviderKind::AwsBedrock, env))?,
            retry: RetryConfig::with_max_retries(env.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn client(&self, provider: ProviderKind) -> &OpenAiCompatibleClient {
        match provider {
            ProviderKind::LmStudio => &self.lm_studio,
            ProviderKind::AwsBedrock => &self.bedrock,
        }
    }
}

impl LlmInvoker for ProviderRouter {
    fn invoke(&self, request: LlmRequest) -> InvokeFuture<'_> {
        let client = self.client(request.model.provider());
        Box::pin(async move {
            tracing::debug!(
                model = request.model.name(),
                provider = request.model.provider().name(),
                temperature = request.temperature,
                "Invoking LLM"
            );
            call_with_retry(|| client.complete(request.clone()), &self.retry).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_per_provider() {
        let env = EnvConfig {
            lm_studio_api_key: Some("local".to_string()),
            bedrock_api_key: Some("remote".to_string()),
            max_retries: 7,
            ..EnvConfig::default()
        };

        let local = client_config(ProviderKind::LmStudio, &env);
        assert_eq!(local.base_url, "http://127.0.0.1:1234/v1");
        assert_eq!(local.api_key.as_deref(), Some("local"));
        assert_eq!(local.max_retries, 7);

        let remote = client_config(ProviderKind::AwsBedrock, &env);
        assert!(remote.base_url.contains("bedrock-runtime"));
        assert_eq!(remote.api_key.as_deref(), Some("remote"));
        assert_eq!(remote.provider, ProviderKind::AwsBedrock);
    }

    #[test]
    fn test_router_builds_from_defaults() {
        let router = ProviderRouter::from_env(&EnvConfig::default()).unwrap();
        assert_eq!(router.client(ProviderKind::LmStudio).base_url(), "http://127.0.0.1:1234/v1");
    }
}
