use std::path::Path;

use crate::config::PromptPaths;
use crate::error::{Error, Result};

pub const SYSTEM_PROMPT: &str = "You are a meticulous compliance reviewer. \
You compare documents against requirements and answer strictly in the response \
format requested by each prompt, without extra commentary.";

pub const DEFAULT_ANALYSIS_TEMPLATE: &str = r#"# Document Compliance Analysis

Judge whether the target document satisfies the requirements stated in the reference text.

## Reference Text
{reference_text}

## Target Document
{file_content}

Respond in exactly this layout:

## Compliance Status
One of: COMPLIANT, NON_COMPLIANT, UNRELATED

## Confidence
A number between 0.0 and 1.0

## Summary
One sentence of at most 100 characters

## Evidence
- Quote or cite the passages that support the judgment

## Recommendations
- Concrete fixes when NON_COMPLIANT, otherwise leave empty
"#;

pub const PAIR_CHECK_TEMPLATE: &str = r#"# Pair Check

Decide whether the fact below satisfies the condition below.

## Condition
{condition}

## Fact
{fact}

Use UNRELATED when the fact does not address the condition at all.
Respond in exactly this layout:

## Compliance Status
One of: COMPLIANT, NON_COMPLIANT, UNRELATED

## Confidence
A number between 0.0 and 1.0

## Summary
One sentence of at most 100 characters

## Evidence
- Cite the parts of the fact that decide the judgment

## Recommendations
- Concrete fixes when NON_COMPLIANT, otherwise leave empty
"#;

pub const SHOULD_EXTRACT_TEMPLATE: &str = r#"# Extraction Necessity

Decide whether the file below should be broken into discrete, structured items
(requirements or claims) before it is compared with its counterpart. Short,
single-topic files usually do not need extraction; long or multi-section files do.

- Path: {file_path}
- Size: {file_size} bytes

## Beginning of File
{file_head}

## Counterpart Context
{source_context}

Respond in exactly this layout:

## Extraction Required
yes or no

## Rationale
One or two sentences
"#;

pub const CONDITION_EXTRACTION_TEMPLATE: &str = r#"# Condition Extraction

Extract every checkable requirement from the reference document. Keep one
requirement per item; nest refinements under the requirement they refine.

## Document Structure
{structure_summary}

## Reference Document
{text}

Answer with a JSON array only, one object per requirement:
[
  { "id": 1, "text": "requirement", "parent_id": null, "source": "section name", "importance": "high" }
]
"importance" is one of "high", "medium", "low". "parent_id" is null or the id of
another item in the same array.
"#;

pub const FACT_EXTRACTION_TEMPLATE: &str = r#"# Fact Extraction

Extract every verifiable claim from the target document. Keep one claim per
item; nest details under the claim they belong to.

## Document Structure
{structure_summary}

## Requirements To Look For
{conditions}

## Target Document
{text}

Answer with a JSON array only, one object per claim:
[
  { "id": 1, "text": "claim", "parent_id": null, "source": "section name", "importance": "medium" }
]
"parent_id" is null or the id of another item in the same array.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    DefaultAnalysis,
    PairCheck,
    ShouldExtract,
    ConditionExtraction,
    FactExtraction,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] = [
        PromptKind::DefaultAnalysis,
        PromptKind::PairCheck,
        PromptKind::ShouldExtract,
        PromptKind::ConditionExtraction,
        PromptKind::FactExtraction,
    ];

    pub fn config_key(&self) -> &'static str {
        match self {
            PromptKind::DefaultAnalysis => "default_analysis",
            PromptKind::PairCheck => "pair_check",
            PromptKind::ShouldExtract => "should_extract",
            PromptKind::ConditionExtraction => "condition_extraction",
            PromptKind::FactExtraction => "fact_extraction",
        }
    }

    /// Placeholders every template of this kind is expected to use.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            PromptKind::DefaultAnalysis => &["reference_text", "file_content"],
            PromptKind::PairCheck => &["condition", "fact"],
            PromptKind::ShouldExtract => &["file_path", "file_size", "file_head", "source_context"],
            PromptKind::ConditionExtraction | PromptKind::FactExtraction => {
                &["text", "structure_summary"]
            }
        }
    }

    pub fn default_template(&self) -> &'static str {
        match self {
            PromptKind::DefaultAnalysis => DEFAULT_ANALYSIS_TEMPLATE,
            PromptKind::PairCheck => PAIR_CHECK_TEMPLATE,
            PromptKind::ShouldExtract => SHOULD_EXTRACT_TEMPLATE,
            PromptKind::ConditionExtraction => CONDITION_EXTRACTION_TEMPLATE,
            PromptKind::FactExtraction => FACT_EXTRACTION_TEMPLATE,
        }
    }
}

/// A prompt with `{name}` placeholders. `{{` and `}}` are literal braces;
/// a brace that does not open a `{identifier}` is kept as written.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let bytes = self.text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if bytes.get(i + 1) == Some(&b'{') {
                    i += 2;
                    continue;
                }
                if let Some((name, end)) = placeholder_at(&self.text, i) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                    i = end;
                    continue;
                }
            }
            i += 1;
        }
        names
    }

    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        let text = self.text.as_str();
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' if bytes.get(i + 1) == Some(&b'{') => {
                    out.push_str(&text[last..i]);
                    out.push('{');
                    i += 2;
                    last = i;
                }
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    out.push_str(&text[last..i]);
                    out.push('}');
                    i += 2;
                    last = i;
                }
                b'{' => match placeholder_at(text, i) {
                    Some((name, end)) => {
                        let value = values
                            .iter()
                            .find(|(key, _)| *key == name)
                            .map(|(_, value)| *value)
                            .ok_or_else(|| Error::Template(name.to_string()))?;
                        out.push_str(&text[last..i]);
                        out.push_str(value);
                        i = end;
                        last = i;
                    }
                    None => i += 1,
                },
                _ => i += 1,
            }
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Returns the placeholder name opened at `start` and the index after `}`.
fn placeholder_at(text: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    let first = *bytes.get(start + 1)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }

    let mut end = start + 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }

    if bytes.get(end) == Some(&b'}') {
        Some((&text[start + 1..end], end + 1))
    } else {
        None
    }
}

/// One template per prompt kind.
#[derive(Debug, Clone)]
pub struct PromptSet {
    default_analysis: PromptTemplate,
    pair_check: PromptTemplate,
    should_extract: PromptTemplate,
    condition_extraction: PromptTemplate,
    fact_extraction: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            default_analysis: PromptTemplate::new(DEFAULT_ANALYSIS_TEMPLATE),
            pair_check: PromptTemplate::new(PAIR_CHECK_TEMPLATE),
            should_extract: PromptTemplate::new(SHOULD_EXTRACT_TEMPLATE),
            condition_extraction: PromptTemplate::new(CONDITION_EXTRACTION_TEMPLATE),
            fact_extraction: PromptTemplate::new(FACT_EXTRACTION_TEMPLATE),
        }
    }
}

impl PromptSet {
    /// Built-in templates overridden by any file named in `paths`.
    pub fn load(paths: &PromptPaths) -> Result<Self> {
        let mut set = Self::default();
        let overrides = [
            (PromptKind::DefaultAnalysis, &paths.default_analysis),
            (PromptKind::PairCheck, &paths.pair_check),
            (PromptKind::ShouldExtract, &paths.should_extract),
            (PromptKind::ConditionExtraction, &paths.condition_extraction),
            (PromptKind::FactExtraction, &paths.fact_extraction),
        ];

        for (kind, path) in overrides {
            if let Some(path) = path {
                set = set.with_template(kind, read_template(kind, path)?);
            }
        }

        Ok(set)
    }

    pub fn with_template(mut self, kind: PromptKind, template: PromptTemplate) -> Self {
        let placeholders = template.placeholders();
        for expected in kind.placeholders() {
            if !placeholders.contains(expected) {
                tracing::warn!(
                    "Prompt '{}' does not use placeholder {{{}}}",
                    kind.config_key(),
                    expected
                );
            }
        }

        match kind {
            PromptKind::DefaultAnalysis => self.default_analysis = template,
            PromptKind::PairCheck => self.pair_check = template,
            PromptKind::ShouldExtract => self.should_extract = template,
            PromptKind::ConditionExtraction => self.condition_extraction = template,
            PromptKind::FactExtraction => self.fact_extraction = template,
        }
        self
    }

    pub fn get(&self, kind: PromptKind) -> &PromptTemplate {
        match kind {
            PromptKind::DefaultAnalysis => &self.default_analysis,
            PromptKind::PairCheck => &self.pair_check,
            PromptKind::ShouldExtract => &self.should_extract,
            PromptKind::ConditionExtraction => &self.condition_extraction,
            PromptKind::FactExtraction => &self.fact_extraction,
        }
    }
}

fn read_template(kind: PromptKind, path: &Path) -> Result<PromptTemplate> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Cannot read '{}' prompt {}: {}",
            kind.config_key(),
            path.display(),
            e
        ))
    })?;
    tracing::debug!("Loaded '{}' prompt from {}", kind.config_key(), path.display());
    Ok(PromptTemplate::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_placeholders() {
        let template = PromptTemplate::new("Condition: {condition}\nFact: {fact}");
        let prompt = template
            .render(&[("condition", "has risk section"), ("fact", "no risks")])
            .unwrap();
        assert_eq!(prompt, "Condition: has risk section\nFact: no risks");
    }

    #[test]
    fn test_missing_value_is_template_error() {
        let template = PromptTemplate::new("{condition} vs {fact}");
        let err = template.render(&[("condition", "a")]).unwrap_err();
        assert!(matches!(err, Error::Template(name) if name == "fact"));
    }

    #[test]
    fn test_unused_values_ignored() {
        let template = PromptTemplate::new("only {text}");
        let prompt = template.render(&[("text", "t"), ("extra", "x")]).unwrap();
        assert_eq!(prompt, "only t");
    }

    #[test]
    fn test_json_braces_and_escapes_are_literal() {
        let template = PromptTemplate::new(r#"[{ "id": 1 }] {{literal}} {text}"#);
        assert_eq!(template.placeholders(), vec!["text"]);
        let prompt = template.render(&[("text", "body")]).unwrap();
        assert_eq!(prompt, r#"[{ "id": 1 }] {literal} body"#);
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let template = PromptTemplate::new("{text}");
        let prompt = template.render(&[("text", "{fact}")]).unwrap();
        assert_eq!(prompt, "{fact}");
    }

    #[test]
    fn test_default_templates_honor_contracts() {
        let set = PromptSet::default();
        for kind in PromptKind::ALL {
            let placeholders = set.get(kind).placeholders();
            for expected in kind.placeholders() {
                assert!(
                    placeholders.contains(expected),
                    "{} lacks {{{}}}",
                    kind.config_key(),
                    expected
                );
            }
        }
    }

    #[test]
    fn test_load_override_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pair.txt");
        std::fs::write(&path, "custom {condition} / {fact}").unwrap();

        let paths = PromptPaths {
            pair_check: Some(path),
            ..Default::default()
        };
        let set = PromptSet::load(&paths).unwrap();
        assert_eq!(set.get(PromptKind::PairCheck).text(), "custom {condition} / {fact}");
        assert_eq!(
            set.get(PromptKind::DefaultAnalysis).text(),
            DEFAULT_ANALYSIS_TEMPLATE
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let paths = PromptPaths {
            should_extract: Some("/nonexistent/prompt.txt".into()),
            ..Default::default()
        };
        assert!(matches!(PromptSet::load(&paths), Err(Error::Config(_))));
    }
}
