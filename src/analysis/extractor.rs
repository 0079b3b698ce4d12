use std::sync::Arc;

use crate::analysis::structure::DocumentStructure;
use crate::error::{Error, Result};
use crate::llm::chunker::TextChunker;
use crate::llm::gateway::LlmGateway;
use crate::llm::parser::parse_extraction_response;
use crate::llm::prompts::PromptTemplate;
use crate::models::document::Document;
use crate::models::item::{ExtractedItem, Importance, ItemBatch, ItemKind, ValidationError};

/// Turns a document into a validated batch of conditions or facts.
pub struct ItemExtractor {
    gateway: Arc<LlmGateway>,
    template: PromptTemplate,
    kind: ItemKind,
    chunker: TextChunker,
}

impl ItemExtractor {
    pub fn new(
        gateway: Arc<LlmGateway>,
        template: PromptTemplate,
        kind: ItemKind,
        max_chunk_tokens: usize,
    ) -> Self {
        Self {
            gateway,
            template,
            kind,
            chunker: TextChunker::new(max_chunk_tokens),
        }
    }

    /// `conditions` is offered to fact prompts as `{conditions}`.
    pub async fn extract(
        &self,
        document: &Document,
        conditions: Option<&ItemBatch>,
    ) -> Result<ItemBatch> {
        if document.content.trim().is_empty() {
            tracing::warn!("{} is empty, nothing to extract", document.display_path());
            return Ok(ItemBatch::empty(self.kind));
        }

        let chunks = self.chunker.chunk(&document.content);
        tracing::info!(
            "Extracting {} from {} ({} chunk{})",
            self.kind.plural(),
            document.display_path(),
            chunks.len(),
            if chunks.len() == 1 { "" } else { "s" }
        );

        let conditions_list = conditions
            .filter(|batch| !batch.is_empty())
            .map(ItemBatch::to_prompt_list)
            .unwrap_or_else(|| "none".to_string());

        let mut merged: Vec<ExtractedItem> = Vec::new();
        let mut responses = Vec::with_capacity(chunks.len());
        let mut next_free = 0u32;

        for (index, chunk) in chunks.iter().enumerate() {
            let structure_summary = DocumentStructure::analyze(chunk).summary();
            let prompt = self.template.render(&[
                ("text", &**chunk),
                ("structure_summary", structure_summary.as_str()),
                ("conditions", conditions_list.as_str()),
            ])?;

            let response = self.gateway.complete(&prompt).await?;
            let items = parse_extraction_response(&response)
                .map_err(|e| Error::validation(e, response.as_str()))?;
            let batch = ItemBatch::new(self.kind, items)
                .map_err(|e| Error::validation(e, response.as_str()))?;

            tracing::debug!(
                "Chunk {}/{} yielded {} {}",
                index + 1,
                chunks.len(),
                batch.len(),
                self.kind.plural()
            );

            // Ids restart in every chunk; move them past everything merged so far.
            let offset = batch
                .iter()
                .map(|item| item.id)
                .min()
                .map_or(0, |min_id| next_free.saturating_sub(min_id));
            for item in batch.into_items() {
                let item = self
                    .shift(item, offset, document)
                    .map_err(|e| Error::validation(e, response.as_str()))?;
                if item.id >= next_free {
                    next_free = item
                        .id
                        .checked_add(1)
                        .ok_or_else(|| Error::validation(id_overflow(), response.as_str()))?;
                }
                merged.push(item);
            }
            responses.push(response);
        }

        let batch = ItemBatch::new(self.kind, merged)
            .map_err(|e| Error::validation(e, responses.join("\n\n")))?;
        tracing::info!("Extracted {} {}", batch.len(), self.kind.plural());
        Ok(batch)
    }

    /// Moves a chunk-local item into the merged id space and fills defaults.
    fn shift(
        &self,
        mut item: ExtractedItem,
        offset: u32,
        document: &Document,
    ) -> std::result::Result<ExtractedItem, ValidationError> {
        item.id = item.id.checked_add(offset).ok_or_else(id_overflow)?;
        item.parent_id = match item.parent_id {
            Some(parent_id) => Some(parent_id.checked_add(offset).ok_or_else(id_overflow)?),
            None => None,
        };

        if item.source.trim().is_empty() {
            item.source = document.display_path();
        }
        if self.kind == ItemKind::Condition && item.importance.is_none() {
            item.importance = Some(Importance::Medium);
        }
        Ok(item)
    }
}

fn id_overflow() -> ValidationError {
    ValidationError::Malformed("item ids overflow across chunks".to_string())
}
