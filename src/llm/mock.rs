//! Deterministic provider for tests and offline runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::LlmOptions;
use crate::error::{Error, Result};
use crate::llm::provider::LLMProvider;

struct Rule {
    needle: String,
    response: String,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    rules: Vec<Rule>,
    queued: VecDeque<String>,
    failures: VecDeque<Error>,
    prompts: Vec<String>,
    finished: Vec<String>,
    last_options: Option<LlmOptions>,
}

/// Answers prompts from canned responses without any network access.
///
/// Lookup order per call: a queued failure, the first rule whose needle
/// occurs in the prompt (after its delay, if any), the next queued
/// response, the default response.
/// Clones share state, so a test can keep a handle after handing one to
/// the gateway.
#[derive(Clone)]
pub struct MockProvider {
    default_response: String,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            default_response: default_response.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `response` whenever the prompt contains `needle`.
    pub fn respond_when(&self, needle: impl Into<String>, response: impl Into<String>) -> &Self {
        self.add_rule(needle.into(), response.into(), None)
    }

    /// Like `respond_when`, but the answer arrives only after `delay`.
    pub fn respond_after(
        &self,
        needle: impl Into<String>,
        response: impl Into<String>,
        delay: Duration,
    ) -> &Self {
        self.add_rule(needle.into(), response.into(), Some(delay))
    }

    fn add_rule(&self, needle: String, response: String, delay: Option<Duration>) -> &Self {
        self.state().rules.push(Rule {
            needle,
            response,
            delay,
        });
        self
    }

    pub fn push_response(&self, response: impl Into<String>) -> &Self {
        self.state().queued.push_back(response.into());
        self
    }

    pub fn fail_next(&self, error: Error) -> &Self {
        self.state().failures.push_back(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.state().prompts.len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    /// Prompts in the order their answers were returned.
    pub fn finished_prompts(&self) -> Vec<String> {
        self.state().finished.clone()
    }

    /// Number of prompts received that contain `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.state()
            .prompts
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }

    pub fn last_options(&self) -> Option<LlmOptions> {
        self.state().last_options.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String> {
        let (response, delay) = {
            let mut state = self.state();
            state.prompts.push(prompt.to_string());
            state.last_options = Some(options.clone());

            if let Some(error) = state.failures.pop_front() {
                return Err(error);
            }

            let rule = state
                .rules
                .iter()
                .find(|rule| prompt.contains(rule.needle.as_str()))
                .map(|rule| (rule.response.clone(), rule.delay));
            match rule {
                Some(answer) => answer,
                None => match state.queued.pop_front() {
                    Some(response) => (response, None),
                    None => (self.default_response.clone(), None),
                },
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state().finished.push(prompt.to_string());
        Ok(response)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LlmOptions {
        LlmOptions::for_model("mock")
    }

    #[tokio::test]
    async fn test_rules_then_queue_then_default() {
        let provider = MockProvider::new("fallback");
        provider.respond_when("hello", "world");
        provider.push_response("first");

        assert_eq!(provider.complete("say hello", &options()).await.unwrap(), "world");
        assert_eq!(provider.complete("other", &options()).await.unwrap(), "first");
        assert_eq!(provider.complete("other", &options()).await.unwrap(), "fallback");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.calls_containing("hello"), 1);
    }

    #[tokio::test]
    async fn test_delayed_rule_finishes_last() {
        let provider = MockProvider::new("fast");
        provider.respond_after("slow", "late", Duration::from_millis(30));

        let (slow_options, fast_options) = (options(), options());
        let (slow, fast) = tokio::join!(
            provider.complete("slow one", &slow_options),
            provider.complete("quick one", &fast_options)
        );
        assert_eq!(slow.unwrap(), "late");
        assert_eq!(fast.unwrap(), "fast");
        assert_eq!(provider.finished_prompts(), vec!["quick one", "slow one"]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let provider = MockProvider::new("x");
        let handle = provider.clone();
        provider.complete("p", &options()).await.unwrap();
        assert_eq!(handle.call_count(), 1);
    }
}
