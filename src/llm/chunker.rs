/// Splits long documents into prompt-sized pieces on paragraph boundaries.
pub struct TextChunker {
    max_tokens: usize,
    reserved_tokens: usize,
}

impl TextChunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            // Reserve tokens for the prompt template (~1000) and response (~1000)
            reserved_tokens: 2_000,
        }
    }

    pub fn available_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_tokens).max(1)
    }

    pub fn estimate_tokens(text: &str) -> usize {
        text.chars().count() / 4
    }

    pub fn needs_chunking(&self, text: &str) -> bool {
        Self::estimate_tokens(text) > self.available_tokens()
    }

    /// Returns the text unchanged as a single chunk when it fits.
    pub fn chunk<'a>(&self, text: &'a str) -> Vec<std::borrow::Cow<'a, str>> {
        if !self.needs_chunking(text) {
            return vec![std::borrow::Cow::Borrowed(text)];
        }

        let max_chars = self.available_tokens() * 4;
        let mut chunks = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
            let paragraph_chars = paragraph.chars().count();

            // If single paragraph is too large, split it by characters
            if paragraph_chars > max_chars {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(split_chars(paragraph, max_chars));
                continue;
            }

            let separator = if current.is_empty() { 0 } else { 2 };
            if current.chars().count() + separator + paragraph_chars > max_chars {
                chunks.push(std::mem::take(&mut current));
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        tracing::debug!("Split {} chars into {} chunks", text.len(), chunks.len());
        chunks.into_iter().map(std::borrow::Cow::Owned).collect()
    }
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(8_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = TextChunker::default();
        let chunks = chunker.chunk("short\n\ntext");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "short\n\ntext");
    }

    #[test]
    fn test_paragraphs_are_grouped_within_budget() {
        // 10 tokens (40 chars) per chunk after reservation
        let chunker = TextChunker::new(2_010);
        let max_chars = chunker.available_tokens() * 4;
        let paragraph = "p".repeat(max_chars / 2 - 1);
        let text = vec![paragraph.as_str(); 5].join("\n\n");

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= max_chars);
        }
        let rejoined: usize = chunks
            .iter()
            .map(|c| c.matches('p').count())
            .sum();
        assert_eq!(rejoined, paragraph.len() * 5);
    }

    #[test]
    fn test_oversized_paragraph_is_split() {
        let chunker = TextChunker::new(2_001);
        let max_chars = chunker.available_tokens() * 4;
        let text = "é".repeat(max_chars * 3 + 1);

        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= max_chars));
    }
}
