//! Lightweight markdown-ish structure scan used to give extraction prompts
//! a map of the document.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        level: usize,
        title: String,
        /// Titles of the enclosing headings joined with " - ".
        path: String,
    },
    ListItem {
        level: usize,
        section: String,
    },
    Paragraph {
        section: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStructure {
    pub blocks: Vec<Block>,
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then_some((level, title))
}

fn list_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ") {
        return true;
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && trimmed[digits..].starts_with(". ")
}

impl DocumentStructure {
    pub fn analyze(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut section = String::new();
        let mut i = 0;

        while i < lines.len() {
            let raw = lines[i];
            let line = raw.trim();

            if let Some((level, title)) = heading(line) {
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title.to_string()));
                section = stack
                    .iter()
                    .map(|(_, t)| t.as_str())
                    .collect::<Vec<_>>()
                    .join(" - ");
                blocks.push(Block::Heading {
                    level,
                    title: title.to_string(),
                    path: section.clone(),
                });
                i += 1;
                continue;
            }

            if list_marker(raw) {
                let indent = raw.len() - raw.trim_start().len();
                // Continuation lines: indented, non-empty, not a new item
                let mut j = i + 1;
                while j < lines.len()
                    && !lines[j].trim().is_empty()
                    && lines[j].len() - lines[j].trim_start().len() > indent
                    && !list_marker(lines[j])
                {
                    j += 1;
                }
                blocks.push(Block::ListItem {
                    level: indent / 2 + 1,
                    section: section.clone(),
                });
                i = j;
                continue;
            }

            if !line.is_empty() {
                let mut j = i + 1;
                while j < lines.len() {
                    let next = lines[j].trim();
                    if next.is_empty() || heading(next).is_some() || list_marker(lines[j]) {
                        break;
                    }
                    j += 1;
                }
                blocks.push(Block::Paragraph {
                    section: section.clone(),
                });
                i = j;
                continue;
            }

            i += 1;
        }

        Self { blocks }
    }

    pub fn headings(&self) -> impl Iterator<Item = (usize, &str)> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Heading { level, title, .. } => Some((*level, title.as_str())),
            _ => None,
        })
    }

    pub fn list_item_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::ListItem { .. }))
            .count()
    }

    pub fn paragraph_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Paragraph { .. }))
            .count()
    }

    /// Prompt-ready description: heading outline plus list and paragraph counts.
    pub fn summary(&self) -> String {
        let mut summary = String::from("The document has the following structure:\n");

        let outline: Vec<String> = self
            .headings()
            .map(|(level, title)| format!("{}- {}", "  ".repeat(level.saturating_sub(1)), title))
            .collect();
        if !outline.is_empty() {
            summary.push_str("\nHeadings:\n");
            summary.push_str(&outline.join("\n"));
            summary.push('\n');
        }

        let list_items = self.list_item_count();
        if list_items > 0 {
            summary.push_str(&format!(
                "\nList items: {}. Extract each in the context of the heading it belongs to.\n",
                list_items
            ));
        }

        let paragraphs = self.paragraph_count();
        if paragraphs > 0 {
            summary.push_str(&format!(
                "\nParagraphs: {}. Extract each in the context of the heading it belongs to.\n",
                paragraphs
            ));
        }

        if outline.is_empty() && list_items == 0 && paragraphs == 0 {
            summary.push_str("\n(empty document)\n");
        }

        summary
    }
}
