use async_trait::async_trait;
use crate::config::LlmOptions;
use crate::error::Result;

/// "Send prompt, receive text". Any backend implementing this can be
/// registered under a name and used interchangeably by the gateway.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, prompt: &str, options: &LlmOptions) -> Result<String>;
    fn name(&self) -> &str;
}
