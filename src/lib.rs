pub mod config;
pub mod error;
pub mod models;
pub mod llm;
pub mod analysis;
pub mod storage;
pub mod report;
pub mod server;

pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use llm::{LLMProvider, LlmGateway, MockProvider, PromptSet, ProviderRegistry};
pub use analysis::{AnalysisPipeline, AnalysisRun, Directives, ExtractionDirective, Strategy};
pub use storage::ItemStore;
pub use report::{OutputFormat, Report};
