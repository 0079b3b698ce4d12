use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::pipeline::{AnalysisRun, DirectiveKind, SideReport, Strategy};
use crate::error::Result;
use crate::llm::parser::{
    CONFIDENCE_HEADING, EVIDENCE_HEADING, RECOMMENDATIONS_HEADING, STATUS_HEADING,
    SUMMARY_HEADING,
};
use crate::models::analysis::{AnalysisResult, ExtractionDecision, Verdict};
use crate::models::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
    Text,
}

/// Final verdict of one run, ready to print.
pub struct Report<'a> {
    run: &'a AnalysisRun,
    source: String,
    target: String,
    generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    source: &'a str,
    target: &'a str,
    strategy: Strategy,
    conditions: JsonSide<'a>,
    facts: JsonSide<'a>,
    result: &'a AnalysisResult,
}

#[derive(Serialize)]
struct JsonSide<'a> {
    directive: DirectiveKind,
    decision: Option<&'a ExtractionDecision>,
    extracted: usize,
}

impl<'a> JsonSide<'a> {
    fn new(side: &'a SideReport) -> Self {
        Self {
            directive: side.directive,
            decision: side.decision.as_ref(),
            extracted: side.batch.as_ref().map_or(0, |b| b.len()),
        }
    }
}

impl<'a> Report<'a> {
    pub fn new(run: &'a AnalysisRun, source: &Document, target: &Document) -> Self {
        Self {
            run,
            source: source.display_path(),
            target: target.display_path(),
            generated_at: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Markdown => Ok(self.format_markdown()),
            OutputFormat::Json => self.format_json(),
            OutputFormat::Text => Ok(self.format_text()),
        }
    }

    fn format_json(&self) -> Result<String> {
        let report = JsonReport {
            generated_at: self.generated_at,
            source: &self.source,
            target: &self.target,
            strategy: self.run.strategy,
            conditions: JsonSide::new(&self.run.conditions),
            facts: JsonSide::new(&self.run.facts),
            result: &self.run.result,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    fn format_markdown(&self) -> String {
        let result = &self.run.result;
        let mut output = String::new();

        output.push_str("# Document Compliance Report\n\n");
        output.push_str(&format!("**Source:** {}\n", self.source));
        output.push_str(&format!("**Target:** {}\n", self.target));
        output.push_str(&format!(
            "**Strategy:** {}\n\n",
            self.run.strategy.description()
        ));

        output.push_str(&format!("## {}\n{}\n\n", STATUS_HEADING, result.verdict));
        output.push_str(&format!(
            "## {}\n{:.2}\n\n",
            CONFIDENCE_HEADING, result.confidence
        ));
        output.push_str(&format!("## {}\n{}\n\n", SUMMARY_HEADING, result.summary));

        output.push_str(&format!("## {}\n", EVIDENCE_HEADING));
        if result.evidence.is_empty() {
            output.push_str("None.\n");
        }
        for evidence in &result.evidence {
            output.push_str(&format!("- {}\n", evidence));
        }

        output.push_str(&format!("\n## {}\n", RECOMMENDATIONS_HEADING));
        if result.recommendations.is_empty() {
            output.push_str("None.\n");
        }
        for recommendation in &result.recommendations {
            output.push_str(&format!("- {}\n", recommendation));
        }

        if let Some(sub_results) = &result.sub_results {
            output.push_str("\n## Item Results\n\n");
            output.push_str("| # | Item | Verdict | Confidence |\n");
            output.push_str("|---|------|---------|------------|\n");
            for sub in sub_results {
                output.push_str(&format!(
                    "| {} | {} | {} | {:.2} |\n",
                    sub.item.id,
                    sub.item.text.replace('|', "\\|").replace('\n', " "),
                    sub.result.verdict,
                    sub.result.confidence
                ));
            }
        }

        output.push_str(&format!(
            "\n---\n*Generated on {}*\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        output
    }

    fn format_text(&self) -> String {
        let result = &self.run.result;
        let mut output = String::new();

        output.push_str("\n=== Compliance Analysis ===\n\n");
        output.push_str(&format!("Source: {}\n", self.source));
        output.push_str(&format!("Target: {}\n", self.target));
        output.push_str(&format!("Strategy: {}\n\n", self.run.strategy.description()));

        let marker = match result.verdict {
            Verdict::Compliant => "✓",
            Verdict::NonCompliant => "✗",
            Verdict::Unrelated => "-",
            Verdict::Unknown => "?",
        };
        output.push_str(&format!(
            "Status: {} {} (confidence: {:.0}%)\n",
            marker,
            result.verdict,
            result.confidence * 100.0
        ));
        if !result.summary.is_empty() {
            output.push_str(&format!("Summary: {}\n", result.summary));
        }

        if !result.evidence.is_empty() {
            output.push_str("\nEvidence:\n");
            for evidence in &result.evidence {
                output.push_str(&format!("  - {}\n", evidence));
            }
        }

        if !result.recommendations.is_empty() {
            output.push_str("\nRecommendations:\n");
            for recommendation in &result.recommendations {
                output.push_str(&format!("  + {}\n", recommendation));
            }
        }

        if let Some(sub_results) = &result.sub_results {
            output.push_str("\nItems:\n");
            for sub in sub_results {
                output.push_str(&format!(
                    "  [{}] {} ({}, {:.0}%)\n",
                    sub.item.id,
                    sub.item.text,
                    sub.result.verdict,
                    sub.result.confidence * 100.0
                ));
            }
        }

        output.push_str(&format!(
            "\nAnalyzed on: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::parser::parse_analysis_response;
    use crate::models::analysis::SubResult;
    use crate::models::item::{ExtractedItem, ItemKind};

    fn side(directive: DirectiveKind) -> SideReport {
        SideReport {
            directive,
            decision: None,
            batch: None,
        }
    }

    fn run(result: AnalysisResult) -> AnalysisRun {
        AnalysisRun {
            strategy: Strategy::ConditionsVsTargetText,
            conditions: side(DirectiveKind::Force),
            facts: side(DirectiveKind::Skip),
            result,
        }
    }

    fn non_compliant() -> AnalysisResult {
        let sub = SubResult {
            kind: ItemKind::Condition,
            item: ExtractedItem::new(2, "Names | an owner"),
            result: AnalysisResult::new(Verdict::NonCompliant, 0.7, "", vec![], vec![]),
        };
        AnalysisResult::new(
            Verdict::NonCompliant,
            0.7,
            "1 conditions checked",
            vec!["[#2] no owner".to_string()],
            vec!["[#2] name one".to_string()],
        )
        .with_sub_results(vec![sub])
    }

    fn documents() -> (Document, Document) {
        (
            Document::from_text("ref.md", ""),
            Document::from_text("target.md", ""),
        )
    }

    #[test]
    fn test_markdown_sections_in_order() {
        let run = run(non_compliant());
        let (source, target) = documents();
        let output = Report::new(&run, &source, &target)
            .render(OutputFormat::Markdown)
            .unwrap();

        let positions: Vec<usize> = [
            "## Compliance Status",
            "## Confidence",
            "## Summary",
            "## Evidence",
            "## Recommendations",
            "## Item Results",
        ]
        .iter()
        .map(|heading| output.find(heading).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(output.contains("| 2 | Names \\| an owner | NON_COMPLIANT | 0.70 |"));
    }

    #[test]
    fn test_markdown_reads_back_as_same_judgment() {
        let run = run(non_compliant());
        let (source, target) = documents();
        let output = Report::new(&run, &source, &target)
            .render(OutputFormat::Markdown)
            .unwrap();

        let parsed = parse_analysis_response(&output).unwrap();
        assert_eq!(parsed.verdict, Verdict::NonCompliant);
        assert!((parsed.confidence - 0.7).abs() < 1e-6);
        assert_eq!(parsed.evidence, vec!["[#2] no owner"]);
        assert_eq!(parsed.recommendations, vec!["[#2] name one"]);
    }

    #[test]
    fn test_empty_sections_say_none() {
        let run = run(AnalysisResult::new(
            Verdict::Compliant,
            1.0,
            "fine",
            vec![],
            vec![],
        ));
        let (source, target) = documents();
        let output = Report::new(&run, &source, &target)
            .render(OutputFormat::Markdown)
            .unwrap();
        assert!(output.contains("## Recommendations\nNone.\n"));
        assert!(!output.contains("## Item Results"));
    }

    #[test]
    fn test_json_report() {
        let run = run(non_compliant());
        let (source, target) = documents();
        let output = Report::new(&run, &source, &target)
            .render(OutputFormat::Json)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["strategy"], "conditions_vs_target_text");
        assert_eq!(value["result"]["verdict"], "NON_COMPLIANT");
        assert_eq!(value["conditions"]["directive"], "force");
        assert_eq!(value["facts"]["extracted"], 0);
        assert_eq!(value["source"], "ref.md");
    }

    #[test]
    fn test_text_report() {
        let run = run(non_compliant());
        let (source, target) = documents();
        let output = Report::new(&run, &source, &target)
            .with_timestamp(DateTime::<Utc>::UNIX_EPOCH)
            .render(OutputFormat::Text)
            .unwrap();

        assert!(output.contains("Status: ✗ NON_COMPLIANT (confidence: 70%)"));
        assert!(output.contains("  + [#2] name one"));
        assert!(output.contains("Analyzed on: 1970-01-01 00:00:00 UTC"));
    }
}
