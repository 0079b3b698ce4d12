pub mod provider;
pub mod gateway;
pub mod claude;
pub mod gemini;
pub mod openai;
pub mod mock;
pub mod prompts;
pub mod parser;
pub mod chunker;

pub use provider::LLMProvider;
pub use gateway::{LlmGateway, ProviderRegistry};
pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
pub use mock::MockProvider;
pub use prompts::{PromptKind, PromptSet, PromptTemplate};
pub use chunker::TextChunker;
