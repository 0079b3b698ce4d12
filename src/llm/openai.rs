use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmOptions;
use crate::error::{Error, Result};
use crate::llm::prompts::SYSTEM_PROMPT;
use crate::llm::provider::LLMProvider;

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAIProvider {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    // The chat API has no top_k; it is ignored here.
    async fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String> {
        let request_body = ChatRequest {
            model: options.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(prompt.to_string()),
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            top_p: options.top_p,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::from_transport(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LLMUnavailable(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMUnavailable(format!("Failed to parse OpenAI response: {}", e)))?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::LLMUnavailable("Empty response from OpenAI".to_string()));
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
