use serde::{Deserialize, Serialize};

use super::item::{ExtractedItem, ItemKind};

pub const SUMMARY_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Compliant,
    NonCompliant,
    Unrelated,
    Unknown,
}

impl Verdict {
    /// Lenient parse of an LLM-written status token.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .trim_matches(|c: char| c == '*' || c == '`' || c == '"' || c == '.')
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "compliant" => Some(Verdict::Compliant),
            "non_compliant" | "noncompliant" => Some(Verdict::NonCompliant),
            "unrelated" => Some(Verdict::Unrelated),
            "unknown" => Some(Verdict::Unknown),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Compliant => 0,
            Verdict::NonCompliant => 1,
            Verdict::Unrelated => 2,
            Verdict::Unknown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Compliant => "COMPLIANT",
            Verdict::NonCompliant => "NON_COMPLIANT",
            Verdict::Unrelated => "UNRELATED",
            Verdict::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub confidence: f32,
    pub summary: String,
    pub evidence: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_results: Option<Vec<SubResult>>,
}

/// Judgment of one condition (or one fact, for the fact-vs-source strategy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubResult {
    pub kind: ItemKind,
    pub item: ExtractedItem,
    pub result: AnalysisResult,
}

impl AnalysisResult {
    /// Builds a result, enforcing the value invariants: confidence in
    /// [0, 1], bounded summary, no recommendations for COMPLIANT/UNRELATED.
    pub fn new(
        verdict: Verdict,
        confidence: f32,
        summary: impl Into<String>,
        evidence: Vec<String>,
        recommendations: Vec<String>,
    ) -> Self {
        let recommendations = match verdict {
            Verdict::Compliant | Verdict::Unrelated => Vec::new(),
            _ => recommendations,
        };

        Self {
            verdict,
            confidence: clamp_confidence(confidence),
            summary: truncate_summary(&summary.into()),
            evidence,
            recommendations,
            sub_results: None,
        }
    }

    /// Fallback for a response that could not be read; the raw text is kept.
    pub fn unparseable(raw_response: &str) -> Self {
        Self::new(
            Verdict::Unknown,
            0.0,
            "LLM response could not be parsed",
            vec![raw_response.to_string()],
            Vec::new(),
        )
    }

    pub fn with_sub_results(mut self, sub_results: Vec<SubResult>) -> Self {
        self.sub_results = Some(sub_results);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionDecision {
    pub needs_extraction: bool,
    pub rationale: Option<String>,
}

impl ExtractionDecision {
    pub fn new(needs_extraction: bool, rationale: impl Into<String>) -> Self {
        Self {
            needs_extraction,
            rationale: Some(rationale.into()),
        }
    }
}

pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn truncate_summary(summary: &str) -> String {
    let trimmed = summary.trim();
    if trimmed.chars().count() <= SUMMARY_MAX_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(SUMMARY_MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parse_variants() {
        assert_eq!(Verdict::parse("compliant"), Some(Verdict::Compliant));
        assert_eq!(Verdict::parse("NON_COMPLIANT"), Some(Verdict::NonCompliant));
        assert_eq!(Verdict::parse("Non-Compliant"), Some(Verdict::NonCompliant));
        assert_eq!(Verdict::parse("**unrelated**"), Some(Verdict::Unrelated));
        assert_eq!(Verdict::parse("maybe"), None);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Verdict::Compliant.exit_code(), 0);
        assert_eq!(Verdict::NonCompliant.exit_code(), 1);
        assert_eq!(Verdict::Unrelated.exit_code(), 2);
        assert_eq!(Verdict::Unknown.exit_code(), 3);
    }

    #[test]
    fn test_confidence_clamped() {
        let high = AnalysisResult::new(Verdict::Compliant, 1.7, "", vec![], vec![]);
        let low = AnalysisResult::new(Verdict::Compliant, -0.2, "", vec![], vec![]);
        let nan = AnalysisResult::new(Verdict::Compliant, f32::NAN, "", vec![], vec![]);
        assert_eq!(high.confidence, 1.0);
        assert_eq!(low.confidence, 0.0);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn test_recommendations_dropped_when_compliant() {
        let result = AnalysisResult::new(
            Verdict::Compliant,
            0.8,
            "ok",
            vec![],
            vec!["add more".to_string()],
        );
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_summary_bounded() {
        let long = "x".repeat(250);
        let result = AnalysisResult::new(Verdict::Unknown, 0.5, long, vec![], vec![]);
        assert_eq!(result.summary.chars().count(), SUMMARY_MAX_CHARS);
    }

    #[test]
    fn test_unparseable_keeps_raw_text() {
        let result = AnalysisResult::unparseable("garbled output");
        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.evidence, vec!["garbled output".to_string()]);
    }

    #[test]
    fn test_verdict_serializes_screaming_case() {
        let json = serde_json::to_string(&Verdict::NonCompliant).unwrap();
        assert_eq!(json, "\"NON_COMPLIANT\"");
    }
}
