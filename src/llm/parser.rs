use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::analysis::{AnalysisResult, ExtractionDecision, Verdict};
use crate::models::item::{ExtractedItem, Importance, ValidationError};

pub const STATUS_HEADING: &str = "Compliance Status";
pub const CONFIDENCE_HEADING: &str = "Confidence";
pub const SUMMARY_HEADING: &str = "Summary";
pub const EVIDENCE_HEADING: &str = "Evidence";
pub const RECOMMENDATIONS_HEADING: &str = "Recommendations";
pub const EXTRACTION_REQUIRED_HEADING: &str = "Extraction Required";
pub const RATIONALE_HEADING: &str = "Rationale";

/// Reads a judgment written in the markdown layout, falling back to a JSON
/// object. `None` when no verdict can be found.
pub fn parse_analysis_response(response: &str) -> Option<AnalysisResult> {
    let sections = split_sections(response);
    if let Some(verdict) = section(&sections, STATUS_HEADING).and_then(parse_verdict_line) {
        let confidence = section(&sections, CONFIDENCE_HEADING)
            .and_then(parse_confidence)
            .unwrap_or(0.0);
        let summary = section(&sections, SUMMARY_HEADING)
            .map(joined_lines)
            .unwrap_or_default();
        let evidence = section(&sections, EVIDENCE_HEADING)
            .map(list_items)
            .unwrap_or_default();
        let recommendations = section(&sections, RECOMMENDATIONS_HEADING)
            .map(list_items)
            .unwrap_or_default();

        return Some(AnalysisResult::new(
            verdict,
            confidence,
            summary,
            evidence,
            recommendations,
        ));
    }

    let json = extract_json(response, '{').ok()?;
    let value: Value = serde_json::from_str(&json).ok()?;
    analysis_from_json(&value)
}

fn analysis_from_json(value: &Value) -> Option<AnalysisResult> {
    let verdict = ["status", "verdict", "compliance_status"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .and_then(Verdict::parse)?;

    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
        Some(Value::String(s)) => parse_confidence(s).unwrap_or(0.0),
        _ => 0.0,
    };
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(AnalysisResult::new(
        verdict,
        confidence,
        summary,
        string_list(value.get("evidence")),
        string_list(value.get("recommendations")),
    ))
}

/// Reads an extraction answer: a JSON array of items, possibly fenced or
/// embedded in prose, or an object wrapping the array.
pub fn parse_extraction_response(
    response: &str,
) -> std::result::Result<Vec<ExtractedItem>, ValidationError> {
    let array = match extract_json(response, '[') {
        Ok(json) => serde_json::from_str::<Value>(&json)
            .map_err(|e| ValidationError::Malformed(format!("invalid JSON array: {}", e)))?,
        Err(_) => wrapped_array(response)?,
    };

    let entries = array
        .as_array()
        .ok_or_else(|| ValidationError::Malformed("expected a JSON array".to_string()))?;

    entries
        .iter()
        .enumerate()
        .map(|(pos, entry)| item_from_json(pos, entry))
        .collect()
}

fn wrapped_array(response: &str) -> std::result::Result<Value, ValidationError> {
    let json = extract_json(response, '{')
        .map_err(|_| ValidationError::Malformed("no JSON found in response".to_string()))?;
    let value: Value = serde_json::from_str(&json)
        .map_err(|e| ValidationError::Malformed(format!("invalid JSON object: {}", e)))?;

    ["items", "conditions", "facts"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_array()).cloned())
        .ok_or_else(|| ValidationError::Malformed("object holds no item array".to_string()))
}

fn item_from_json(pos: usize, entry: &Value) -> std::result::Result<ExtractedItem, ValidationError> {
    let id = entry
        .get("id")
        .and_then(as_id)
        .ok_or_else(|| ValidationError::Malformed(format!("item #{} has no numeric id", pos + 1)))?;

    let text = entry
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ValidationError::Malformed(format!("item {} has no text", id)))?;

    let parent_id = match entry.get("parent_id") {
        None | Some(Value::Null) => None,
        Some(value) => Some(as_id(value).ok_or_else(|| {
            ValidationError::Malformed(format!("item {} has a non-numeric parent_id", id))
        })?),
    };

    let mut item = ExtractedItem::new(id, text);
    item.parent_id = parent_id;
    if let Some(source) = entry.get("source").and_then(Value::as_str) {
        item.source = source.trim().to_string();
    }
    item.importance = entry
        .get("importance")
        .and_then(Value::as_str)
        .and_then(parse_importance);

    Ok(item)
}

fn as_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_importance(raw: &str) -> Option<Importance> {
    match raw.trim().to_lowercase().as_str() {
        "high" => Some(Importance::High),
        "medium" => Some(Importance::Medium),
        "low" => Some(Importance::Low),
        _ => None,
    }
}

/// Reads a yes/no extraction decision. `None` when the answer is missing.
pub fn parse_extraction_decision(response: &str) -> Option<ExtractionDecision> {
    let sections = split_sections(response);
    if let Some(needs_extraction) =
        section(&sections, EXTRACTION_REQUIRED_HEADING).and_then(|body| {
            body.lines()
                .map(clean_line)
                .find(|line| !line.is_empty())
                .and_then(parse_yes_no)
        })
    {
        let rationale = section(&sections, RATIONALE_HEADING)
            .map(joined_lines)
            .filter(|r| !r.is_empty());
        return Some(ExtractionDecision {
            needs_extraction,
            rationale,
        });
    }

    let json = extract_json(response, '{').ok()?;
    let value: Value = serde_json::from_str(&json).ok()?;
    let needs_extraction = match value.get("needs_extraction")? {
        Value::Bool(b) => *b,
        Value::String(s) => parse_yes_no(s)?,
        _ => return None,
    };
    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ExtractionDecision {
        needs_extraction,
        rationale,
    })
}

fn parse_yes_no(raw: &str) -> Option<bool> {
    let word = raw
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    let first = word.split_whitespace().next().unwrap_or_default();
    match first.trim_matches(|c: char| !c.is_alphanumeric()) {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

/// Splits markdown into `(heading, body)` pairs. Headings are compared
/// case-insensitively without `#`, `*` or a trailing colon.
fn split_sections(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let heading = normalize_heading(trimmed.trim_start_matches('#'));
            sections.push((heading, String::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    sections
}

fn normalize_heading(raw: &str) -> String {
    raw.trim()
        .trim_matches('*')
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

fn section<'a>(sections: &'a [(String, String)], heading: &str) -> Option<&'a str> {
    let wanted = heading.to_lowercase();
    sections
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, body)| body.as_str())
}

fn parse_verdict_line(body: &str) -> Option<Verdict> {
    let line = body.lines().map(clean_line).find(|l| !l.is_empty())?;
    Verdict::parse(line).or_else(|| line.split_whitespace().next().and_then(Verdict::parse))
}

fn parse_confidence(body: &str) -> Option<f32> {
    let line = body.lines().map(clean_line).find(|l| !l.is_empty())?;
    let mut start = line.find(|c: char| c.is_ascii_digit())?;
    if line[..start].ends_with('.') {
        start -= 1;
    }
    let negative = line[..start].ends_with('-');

    let rest = &line[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f32 = rest[..end].trim_end_matches('.').parse().ok()?;
    let value = if negative { -value } else { value };

    // Only a percent sign attached to this number scales it.
    if rest[end..].trim_start().starts_with('%') {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}

fn clean_line(line: &str) -> &str {
    line.trim().trim_matches('*').trim()
}

fn joined_lines(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn list_items(body: &str) -> Vec<String> {
    body.lines()
        .map(strip_bullet)
        .filter(|item| !item.is_empty() && !is_placeholder(item))
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
    {
        return rest.trim();
    }

    // Numbered list: "1. item" or "1) item"
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(item) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return item.trim();
        }
    }

    if trimmed == "-" || trimmed == "*" {
        return "";
    }
    trimmed
}

fn is_placeholder(item: &str) -> bool {
    matches!(
        item.to_lowercase().trim_end_matches('.'),
        "none" | "n/a" | "na" | "nothing"
    )
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Finds the first JSON value opened by `open` (`{` or `[`): a fenced block
/// first, then a balanced span in the raw text.
pub fn extract_json(text: &str, open: char) -> Result<String> {
    let close = if open == '[' { ']' } else { '}' };

    // Try to find JSON block in markdown code blocks
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with(open) {
                return Ok(content.to_string());
            }
        }
    }

    // Try plain code block
    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip any language identifier on the same line
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with(open) {
                return Ok(content.to_string());
            }
        }
    }

    // Try to find a raw balanced value
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(open) {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..], open, close) {
            let candidate = &text[start..start + end];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Ok(candidate.to_string());
            }
        }
        search_from = start + open.len_utf8();
    }

    Err(Error::ParseError("No valid JSON found in response".to_string()))
}

/// Byte length of the balanced span starting at `text[0]`.
fn balanced_end(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKDOWN_RESPONSE: &str = "\
## Compliance Status
NON_COMPLIANT

## Confidence
0.8

## Summary
The risk section is missing.

## Evidence
- No heading mentions risks
- Section 3 ends abruptly

## Recommendations
1. Add a risk section
2. List mitigations
";

    #[test]
    fn test_extract_json_from_markdown() {
        let input = r#"Here's the analysis:
```json
{"status": "COMPLIANT"}
```
"#;
        let result = extract_json(input, '{').unwrap();
        assert_eq!(result, r#"{"status": "COMPLIANT"}"#);
    }

    #[test]
    fn test_extract_raw_json() {
        let input = r#"The result is {"evidence": [], "recommendations": []}"#;
        let result = extract_json(input, '{').unwrap();
        assert_eq!(result, r#"{"evidence": [], "recommendations": []}"#);
    }

    #[test]
    fn test_extract_array_skips_bracketed_prose() {
        let input = r#"Items [see below]: [{"id": 1, "text": "ünïcode"}] done"#;
        let result = extract_json(input, '[').unwrap();
        assert_eq!(result, r#"[{"id": 1, "text": "ünïcode"}]"#);
    }

    #[test]
    fn test_parse_markdown_analysis() {
        let result = parse_analysis_response(MARKDOWN_RESPONSE).unwrap();
        assert_eq!(result.verdict, Verdict::NonCompliant);
        assert!((result.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(result.summary, "The risk section is missing.");
        assert_eq!(result.evidence.len(), 2);
        assert_eq!(
            result.recommendations,
            vec!["Add a risk section", "List mitigations"]
        );
    }

    #[test]
    fn test_parse_markdown_without_confidence() {
        let response = "## Compliance Status\n**Compliant**\n## Summary\nFine\n## Recommendations\n- ignored";
        let result = parse_analysis_response(response).unwrap();
        assert_eq!(result.verdict, Verdict::Compliant);
        assert_eq!(result.confidence, 0.0);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_parse_confidence_clamped_and_percent() {
        let high = "## Compliance Status\nCOMPLIANT\n## Confidence\n7";
        assert_eq!(parse_analysis_response(high).unwrap().confidence, 1.0);

        let percent = "## Compliance Status\nUNRELATED\n## Confidence\n40%";
        let result = parse_analysis_response(percent).unwrap();
        assert!((result.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_negative_confidence_clamps_to_zero() {
        let negative = "## Compliance Status\nCOMPLIANT\n## Confidence\n-0.5";
        assert_eq!(parse_analysis_response(negative).unwrap().confidence, 0.0);

        let labelled = "## Compliance Status\nCOMPLIANT\n## Confidence\nscore: -1";
        assert_eq!(parse_analysis_response(labelled).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_percent_applies_only_to_attached_number() {
        let annotated = "## Compliance Status\nCOMPLIANT\n## Confidence\n0.85 (85%)";
        let result = parse_analysis_response(annotated).unwrap();
        assert!((result.confidence - 0.85).abs() < 1e-6);

        let spaced = "## Compliance Status\nCOMPLIANT\n## Confidence\n**72 %**";
        let result = parse_analysis_response(spaced).unwrap();
        assert!((result.confidence - 0.72).abs() < 1e-6);

        let sentence = "## Compliance Status\nCOMPLIANT\n## Confidence\n0.9.";
        let result = parse_analysis_response(sentence).unwrap();
        assert!((result.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_json_analysis() {
        let response = r#"```json
{"verdict": "non-compliant", "confidence": 0.6, "summary": "s", "evidence": ["e"], "recommendations": ["r"]}
```"#;
        let result = parse_analysis_response(response).unwrap();
        assert_eq!(result.verdict, Verdict::NonCompliant);
        assert_eq!(result.evidence, vec!["e"]);
        assert_eq!(result.recommendations, vec!["r"]);
    }

    #[test]
    fn test_unparseable_analysis() {
        assert!(parse_analysis_response("I cannot decide.").is_none());
        assert!(parse_analysis_response("## Compliance Status\nmaybe").is_none());
    }

    #[test]
    fn test_parse_extraction_array() {
        let response = r#"Sure:
```json
[
  {"id": 1, "text": "Has risks", "parent_id": null, "source": "Intro", "importance": "high"},
  {"id": "2", "text": "Lists mitigations", "parent_id": 1, "importance": "critical"}
]
```"#;
        let items = parse_extraction_response(response).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].importance, Some(Importance::High));
        assert_eq!(items[0].source, "Intro");
        assert_eq!(items[1].id, 2);
        assert_eq!(items[1].parent_id, Some(1));
        assert_eq!(items[1].importance, None);
    }

    #[test]
    fn test_parse_extraction_wrapped_object() {
        let response = r#"{"conditions": [{"id": 3, "text": "x"}]}"#;
        let items = parse_extraction_response(response).unwrap();
        assert_eq!(items[0].id, 3);
    }

    #[test]
    fn test_parse_extraction_malformed() {
        assert!(matches!(
            parse_extraction_response("no json here"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            parse_extraction_response(r#"[{"text": "missing id"}]"#),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_extraction_decision_markdown() {
        let response = "## Extraction Required\nYes.\n\n## Rationale\nLong document\nwith sections";
        let decision = parse_extraction_decision(response).unwrap();
        assert!(decision.needs_extraction);
        assert_eq!(
            decision.rationale.as_deref(),
            Some("Long document with sections")
        );

        let no = parse_extraction_decision("# extraction required:\n**false**").unwrap();
        assert!(!no.needs_extraction);
        assert!(no.rationale.is_none());
    }

    #[test]
    fn test_parse_extraction_decision_json() {
        let decision =
            parse_extraction_decision(r#"{"needs_extraction": true, "rationale": "big"}"#).unwrap();
        assert!(decision.needs_extraction);
        assert_eq!(decision.rationale.as_deref(), Some("big"));
        assert!(parse_extraction_decision("perhaps").is_none());
    }
}
