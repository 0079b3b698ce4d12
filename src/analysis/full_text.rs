use std::sync::Arc;

use crate::error::Result;
use crate::llm::gateway::LlmGateway;
use crate::llm::parser::parse_analysis_response;
use crate::llm::prompts::PromptTemplate;
use crate::models::analysis::AnalysisResult;

/// Compares whole texts in a single judgment.
pub struct FullTextAnalyzer {
    gateway: Arc<LlmGateway>,
    template: PromptTemplate,
}

impl FullTextAnalyzer {
    pub fn new(gateway: Arc<LlmGateway>, template: PromptTemplate) -> Self {
        Self { gateway, template }
    }

    pub async fn analyze(&self, reference_text: &str, target_text: &str) -> Result<AnalysisResult> {
        let reference = preprocess_reference(reference_text);
        let prompt = self.template.render(&[
            ("reference_text", reference.as_str()),
            ("file_content", target_text),
        ])?;
        let response = self.gateway.complete(&prompt).await?;

        Ok(parse_analysis_response(&response).unwrap_or_else(|| {
            tracing::warn!("Analysis response could not be parsed, marking UNKNOWN");
            AnalysisResult::unparseable(&response)
        }))
    }
}

/// Trims every line and drops blank ones.
pub fn preprocess_reference(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
