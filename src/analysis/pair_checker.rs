use std::sync::Arc;

use crate::error::Result;
use crate::llm::gateway::LlmGateway;
use crate::llm::parser::parse_analysis_response;
use crate::llm::prompts::PromptTemplate;
use crate::models::analysis::{AnalysisResult, Verdict};

/// Judges one condition against one fact (or a block of fact text).
pub struct PairChecker {
    gateway: Arc<LlmGateway>,
    template: PromptTemplate,
}

impl PairChecker {
    pub fn new(gateway: Arc<LlmGateway>, template: PromptTemplate) -> Self {
        Self { gateway, template }
    }

    pub async fn check(&self, condition: &str, fact: &str) -> Result<AnalysisResult> {
        let prompt = self
            .template
            .render(&[("condition", condition), ("fact", fact)])?;
        let response = self.gateway.complete(&prompt).await?;

        Ok(parse_analysis_response(&response).unwrap_or_else(|| {
            tracing::warn!("Pair check response could not be parsed, marking UNKNOWN");
            AnalysisResult::unparseable(&response)
        }))
    }
}

/// Folds several judgments into one verdict and the minimum confidence.
///
/// NON_COMPLIANT wins outright. UNRELATED only when every result is
/// UNRELATED. Otherwise COMPLIANT when every related result is COMPLIANT,
/// and UNKNOWN if any related result is UNKNOWN. No results is UNKNOWN.
pub fn aggregate(results: &[AnalysisResult]) -> (Verdict, f32) {
    if results.is_empty() {
        return (Verdict::Unknown, 0.0);
    }

    let confidence = results
        .iter()
        .map(|r| r.confidence)
        .fold(f32::INFINITY, f32::min);

    let verdict = if results.iter().any(|r| r.verdict == Verdict::NonCompliant) {
        Verdict::NonCompliant
    } else if results.iter().all(|r| r.verdict == Verdict::Unrelated) {
        Verdict::Unrelated
    } else if results
        .iter()
        .filter(|r| r.verdict != Verdict::Unrelated)
        .all(|r| r.verdict == Verdict::Compliant)
    {
        Verdict::Compliant
    } else {
        Verdict::Unknown
    };

    (verdict, confidence)
}
