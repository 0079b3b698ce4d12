use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::analysis::classifier::{ClassificationRequest, ExtractionClassifier};
use crate::analysis::extractor::ItemExtractor;
use crate::analysis::full_text::FullTextAnalyzer;
use crate::analysis::pair_checker::{aggregate, PairChecker};
use crate::config::{PairingPolicy, PipelineConfig};
use crate::error::Result;
use crate::llm::gateway::LlmGateway;
use crate::llm::prompts::{PromptKind, PromptSet};
use crate::models::analysis::{AnalysisResult, ExtractionDecision, SubResult, Verdict};
use crate::models::document::Document;
use crate::models::item::{ExtractedItem, ItemBatch, ItemKind};

/// How the source and target are compared once extraction is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FullPairCheck,
    ConditionsVsTargetText,
    FactsVsSourceText,
    FullText,
}

impl Strategy {
    pub fn select(source_extracted: bool, target_extracted: bool) -> Self {
        match (source_extracted, target_extracted) {
            (true, true) => Strategy::FullPairCheck,
            (true, false) => Strategy::ConditionsVsTargetText,
            (false, true) => Strategy::FactsVsSourceText,
            (false, false) => Strategy::FullText,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Strategy::FullPairCheck => "conditions checked against extracted facts",
            Strategy::ConditionsVsTargetText => "conditions checked against the target text",
            Strategy::FactsVsSourceText => "facts checked against the source text",
            Strategy::FullText => "full-text comparison",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::FullPairCheck => write!(f, "full_pair_check"),
            Strategy::ConditionsVsTargetText => write!(f, "conditions_vs_target_text"),
            Strategy::FactsVsSourceText => write!(f, "facts_vs_source_text"),
            Strategy::FullText => write!(f, "full_text"),
        }
    }
}

/// Per-side override of the classifier.
#[derive(Debug, Clone, Default)]
pub enum ExtractionDirective {
    #[default]
    Auto,
    Skip,
    Force,
    UseExisting(ItemBatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Auto,
    Skip,
    Force,
    UseExisting,
}

impl ExtractionDirective {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            ExtractionDirective::Auto => DirectiveKind::Auto,
            ExtractionDirective::Skip => DirectiveKind::Skip,
            ExtractionDirective::Force => DirectiveKind::Force,
            ExtractionDirective::UseExisting(_) => DirectiveKind::UseExisting,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Directives {
    pub conditions: ExtractionDirective,
    pub facts: ExtractionDirective,
}

/// How one side was resolved.
#[derive(Debug, Clone)]
pub struct SideReport {
    pub directive: DirectiveKind,
    /// Present only when the classifier was consulted.
    pub decision: Option<ExtractionDecision>,
    pub batch: Option<ItemBatch>,
}

impl SideReport {
    /// A side counts as extracted only when it produced items.
    pub fn extracted(&self) -> bool {
        self.batch.as_ref().is_some_and(|batch| !batch.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub strategy: Strategy,
    pub conditions: SideReport,
    pub facts: SideReport,
    pub result: AnalysisResult,
}

pub struct AnalysisPipeline {
    classifier: ExtractionClassifier,
    condition_extractor: ItemExtractor,
    fact_extractor: ItemExtractor,
    pair_checker: PairChecker,
    full_text: FullTextAnalyzer,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(gateway: LlmGateway, prompts: &PromptSet, config: PipelineConfig) -> Self {
        let gateway = Arc::new(gateway);
        let template = |kind| prompts.get(kind).clone();

        Self {
            classifier: ExtractionClassifier::new(
                gateway.clone(),
                template(PromptKind::ShouldExtract),
            ),
            condition_extractor: ItemExtractor::new(
                gateway.clone(),
                template(PromptKind::ConditionExtraction),
                ItemKind::Condition,
                config.max_chunk_tokens,
            ),
            fact_extractor: ItemExtractor::new(
                gateway.clone(),
                template(PromptKind::FactExtraction),
                ItemKind::Fact,
                config.max_chunk_tokens,
            ),
            pair_checker: PairChecker::new(gateway.clone(), template(PromptKind::PairCheck)),
            full_text: FullTextAnalyzer::new(gateway, template(PromptKind::DefaultAnalysis)),
            config,
        }
    }

    pub async fn run(
        &self,
        source: &Document,
        target: &Document,
        directives: &Directives,
    ) -> Result<AnalysisRun> {
        // Step 1: Conditions from the source
        tracing::info!("Resolving conditions for {}", source.display_path());
        let conditions = self
            .resolve_side(ItemKind::Condition, &directives.conditions, source, None, None)
            .await?;

        // Step 2: Facts from the target, classified against the conditions
        tracing::info!("Resolving facts for {}", target.display_path());
        let context = self.target_context(source, &conditions);
        let facts = self
            .resolve_side(
                ItemKind::Fact,
                &directives.facts,
                target,
                Some(context),
                conditions.batch.as_ref(),
            )
            .await?;

        // Step 3: Pick the comparison
        let strategy = Strategy::select(conditions.extracted(), facts.extracted());
        tracing::info!("Strategy: {} ({})", strategy, strategy.description());

        // Step 4: Judge
        let result = match (strategy, &conditions.batch, &facts.batch) {
            (Strategy::FullPairCheck, Some(condition_batch), Some(fact_batch)) => {
                self.check_conditions_against_facts(condition_batch, fact_batch)
                    .await?
            }
            (Strategy::ConditionsVsTargetText, Some(condition_batch), _) => {
                self.check_conditions_against_text(condition_batch, &target.content)
                    .await?
            }
            (Strategy::FactsVsSourceText, _, Some(fact_batch)) => {
                self.check_facts_against_text(fact_batch, &source.content)
                    .await?
            }
            _ => {
                self.full_text
                    .analyze(&source.content, &target.content)
                    .await?
            }
        };

        tracing::info!(
            "Verdict: {} (confidence {:.2})",
            result.verdict,
            result.confidence
        );

        Ok(AnalysisRun {
            strategy,
            conditions,
            facts,
            result,
        })
    }

    pub async fn extract_conditions(&self, source: &Document) -> Result<ItemBatch> {
        self.condition_extractor.extract(source, None).await
    }

    pub async fn extract_facts(
        &self,
        target: &Document,
        conditions: Option<&ItemBatch>,
    ) -> Result<ItemBatch> {
        self.fact_extractor.extract(target, conditions).await
    }

    async fn resolve_side(
        &self,
        kind: ItemKind,
        directive: &ExtractionDirective,
        document: &Document,
        source_context: Option<String>,
        conditions: Option<&ItemBatch>,
    ) -> Result<SideReport> {
        let extractor = match kind {
            ItemKind::Condition => &self.condition_extractor,
            ItemKind::Fact => &self.fact_extractor,
        };

        let (decision, batch) = match directive {
            ExtractionDirective::Skip => {
                tracing::info!("Skipping {} extraction", kind);
                (None, None)
            }
            ExtractionDirective::Force => {
                tracing::info!("Forcing {} extraction", kind);
                (None, Some(extractor.extract(document, conditions).await?))
            }
            ExtractionDirective::UseExisting(batch) => {
                tracing::info!("Using {} existing {}", batch.len(), kind.plural());
                (None, Some(batch.clone()))
            }
            ExtractionDirective::Auto => {
                let request = ClassificationRequest {
                    file_path: document.display_path(),
                    file_size: document.size_bytes,
                    file_head: document.head(self.config.file_head_chars).to_string(),
                    source_context,
                };
                let decision = self.classifier.classify(&request).await?;
                let batch = if decision.needs_extraction {
                    Some(extractor.extract(document, conditions).await?)
                } else {
                    None
                };
                (Some(decision), batch)
            }
        };

        Ok(SideReport {
            directive: directive.kind(),
            decision,
            batch,
        })
    }

    /// Extracted conditions one per line, else the bounded source text.
    fn target_context(&self, source: &Document, conditions: &SideReport) -> String {
        match conditions.batch.as_ref().filter(|batch| !batch.is_empty()) {
            Some(batch) => batch
                .iter()
                .map(|item| item.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            None => source.head(self.config.max_context_chars).to_string(),
        }
    }

    async fn check_conditions_against_facts(
        &self,
        conditions: &ItemBatch,
        facts: &ItemBatch,
    ) -> Result<AnalysisResult> {
        let sub_results = match self.config.pairing {
            PairingPolicy::AllFacts => {
                let fact_text = facts.to_prompt_list();
                self.check_each(conditions.items(), |condition| {
                    let fact_text = fact_text.as_str();
                    async move { self.pair_checker.check(&condition.text, fact_text).await }
                })
                .await?
            }
            PairingPolicy::EachFact => {
                self.check_each(conditions.items(), |condition| async move {
                    let mut per_fact = Vec::with_capacity(facts.len());
                    for fact in facts.iter() {
                        let result = self.pair_checker.check(&condition.text, &fact.text).await?;
                        per_fact.push((fact.clone(), result));
                    }
                    Ok::<_, crate::error::Error>(merge(ItemKind::Fact, per_fact))
                })
                .await?
            }
        };

        Ok(merge(ItemKind::Condition, sub_results))
    }

    async fn check_conditions_against_text(
        &self,
        conditions: &ItemBatch,
        text: &str,
    ) -> Result<AnalysisResult> {
        let sub_results = self
            .check_each(conditions.items(), |condition| async move {
                self.pair_checker.check(&condition.text, text).await
            })
            .await?;
        Ok(merge(ItemKind::Condition, sub_results))
    }

    async fn check_facts_against_text(
        &self,
        facts: &ItemBatch,
        text: &str,
    ) -> Result<AnalysisResult> {
        let sub_results = self
            .check_each(facts.items(), |fact| async move {
                self.pair_checker.check(text, &fact.text).await
            })
            .await?;
        Ok(merge(ItemKind::Fact, sub_results))
    }

    /// Runs `check` for every item, at most `concurrency_limit` at a time,
    /// keeping item order in the output.
    async fn check_each<'a, F, Fut>(
        &self,
        items: &'a [ExtractedItem],
        check: F,
    ) -> Result<Vec<(ExtractedItem, AnalysisResult)>>
    where
        F: Fn(&'a ExtractedItem) -> Fut,
        Fut: std::future::Future<Output = Result<AnalysisResult>> + 'a,
    {
        let pb = self.progress_bar(items.len());
        let check = &check;

        let futures: Vec<_> = items
            .iter()
            .map(|item: &'a ExtractedItem| {
                let pb = pb.clone();
                async move {
                    let result = check(item).await?;
                    pb.inc(1);
                    tracing::debug!("Item {} judged {}", item.id, result.verdict);
                    Ok::<_, crate::error::Error>((item.clone(), result))
                }
            })
            .collect();

        let results = stream::iter(futures)
            .buffered(self.config.concurrency_limit.max(1))
            .try_collect::<Vec<_>>()
            .await;

        pb.finish_and_clear();
        results
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} checks")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb
    }
}

/// Folds per-item judgments into one result that keeps them as sub-results.
fn merge(kind: ItemKind, judged: Vec<(ExtractedItem, AnalysisResult)>) -> AnalysisResult {
    let results: Vec<AnalysisResult> = judged.iter().map(|(_, r)| r.clone()).collect();
    let (verdict, confidence) = aggregate(&results);

    let count = |v: Verdict| results.iter().filter(|r| r.verdict == v).count();
    let summary = format!(
        "{} {} checked: {} compliant, {} non-compliant, {} unrelated, {} unknown",
        judged.len(),
        kind.plural(),
        count(Verdict::Compliant),
        count(Verdict::NonCompliant),
        count(Verdict::Unrelated),
        count(Verdict::Unknown)
    );

    let evidence = judged
        .iter()
        .flat_map(|(item, r)| r.evidence.iter().map(move |e| format!("[#{}] {}", item.id, e)))
        .collect();

    let recommendations = judged
        .iter()
        .filter(|(_, r)| matches!(r.verdict, Verdict::NonCompliant | Verdict::Unknown))
        .flat_map(|(item, r)| {
            r.recommendations
                .iter()
                .map(move |rec| format!("[#{}] {}", item.id, rec))
        })
        .collect();

    let sub_results = judged
        .into_iter()
        .map(|(item, result)| SubResult { kind, item, result })
        .collect();

    AnalysisResult::new(verdict, confidence, summary, evidence, recommendations)
        .with_sub_results(sub_results)
}
