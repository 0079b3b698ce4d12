use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, LlmOptions};
use crate::error::{Error, Result};
use crate::llm::claude::ClaudeProvider;
use crate::llm::gemini::GeminiProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::provider::LLMProvider;

/// Name → provider mapping. New backends are added by registration.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in provider whose API key is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        let timeout = config.timeout_secs;

        if let Some(key) = &config.api_keys.anthropic {
            registry.register("claude", ClaudeProvider::new(key.clone(), timeout)?);
        }
        if let Some(key) = &config.api_keys.gemini {
            registry.register("gemini", GeminiProvider::new(key.clone(), timeout)?);
        }
        if let Some(key) = &config.api_keys.openai {
            registry.register("openai", OpenAIProvider::new(key.clone(), timeout)?);
        }

        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, provider: impl LLMProvider + 'static) {
        let name = name.into();
        tracing::debug!("Registered LLM provider: {}", name);
        self.providers.insert(name, Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LLMProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(format!(
                "{} (available: {})",
                name,
                self.names().join(", ")
            )))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// The single door the pipeline uses to reach an LLM. Owns the per-attempt
/// deadline and the retry budget for transport failures.
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LLMProvider>,
    options: LlmOptions,
    max_retries: u32,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, options: LlmOptions) -> Self {
        Self {
            provider,
            options,
            max_retries: 1,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(registry: &ProviderRegistry, config: &Config, name: &str) -> Result<Self> {
        let provider = registry.get(name)?;
        Ok(Self::new(provider, config.llm_options(name))
            .with_retries(config.max_retries)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn options(&self) -> &LlmOptions {
        &self.options
    }

    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                "Sending ~{} tokens to {} (attempt {})",
                prompt.len() / 4,
                self.provider.name(),
                attempt
            );

            let outcome = match tokio::time::timeout(
                self.timeout,
                self.provider.complete(prompt, &self.options),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::LLMTimeout(self.timeout.as_secs())),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    tracing::warn!("LLM call failed, retrying: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;

    fn gateway(provider: &MockProvider) -> LlmGateway {
        LlmGateway::new(Arc::new(provider.clone()), LlmOptions::for_model("mock"))
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let provider = MockProvider::new("answer");
        provider.fail_next(Error::LLMUnavailable("503".into()));

        let text = gateway(&provider).complete("prompt").await.unwrap();
        assert_eq!(text, "answer");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_is_fatal() {
        let provider = MockProvider::new("answer");
        provider.fail_next(Error::LLMTimeout(5));
        provider.fail_next(Error::LLMTimeout(5));

        let err = gateway(&provider).complete("prompt").await.unwrap_err();
        assert!(matches!(err, Error::LLMTimeout(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let provider = MockProvider::new("answer");
        provider.fail_next(Error::Config("bad key".into()));

        let err = gateway(&provider).complete("prompt").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_options_reach_provider() {
        let provider = MockProvider::new("ok");
        let gw = LlmGateway::new(Arc::new(provider.clone()), LlmOptions::for_model("m-1"));
        gw.complete("hello").await.unwrap();
        assert_eq!(provider.last_options().map(|o| o.model_name), Some("m-1".to_string()));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register("mock", MockProvider::new("x"));
        assert!(registry.get("mock").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(Error::UnknownProvider(_))
        ));
        assert_eq!(registry.names(), vec!["mock".to_string()]);
    }
}
