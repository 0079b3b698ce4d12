use std::sync::Arc;

use crate::error::Result;
use crate::llm::gateway::LlmGateway;
use crate::llm::parser::parse_extraction_decision;
use crate::llm::prompts::PromptTemplate;
use crate::models::analysis::ExtractionDecision;

/// What the classifier sees of one file.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub file_path: String,
    pub file_size: u64,
    pub file_head: String,
    /// Counterpart context: extracted conditions or bounded source text.
    pub source_context: Option<String>,
}

/// Asks the LLM whether a file should be broken into items first.
pub struct ExtractionClassifier {
    gateway: Arc<LlmGateway>,
    template: PromptTemplate,
}

impl ExtractionClassifier {
    pub fn new(gateway: Arc<LlmGateway>, template: PromptTemplate) -> Self {
        Self { gateway, template }
    }

    pub async fn classify(&self, request: &ClassificationRequest) -> Result<ExtractionDecision> {
        let file_size = request.file_size.to_string();
        let source_context = request.source_context.as_deref().unwrap_or("none");
        let prompt = self.template.render(&[
            ("file_path", request.file_path.as_str()),
            ("file_size", file_size.as_str()),
            ("file_head", request.file_head.as_str()),
            ("source_context", source_context),
        ])?;

        let response = self.gateway.complete(&prompt).await?;

        let decision = match parse_extraction_decision(&response) {
            Some(decision) => decision,
            None => {
                tracing::warn!(
                    "Could not read extraction decision for {}, assuming no extraction",
                    request.file_path
                );
                ExtractionDecision::new(
                    false,
                    "Classifier response could not be parsed; extraction skipped",
                )
            }
        };

        tracing::info!(
            "Extraction {} for {}",
            if decision.needs_extraction { "required" } else { "not required" },
            request.file_path
        );
        if let Some(rationale) = &decision.rationale {
            tracing::debug!("Rationale: {}", rationale);
        }

        Ok(decision)
    }
}
