use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Condition,
    Fact,
}

impl ItemKind {
    pub fn plural(&self) -> &'static str {
        match self {
            ItemKind::Condition => "conditions",
            ItemKind::Fact => "facts",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Condition => write!(f, "condition"),
            ItemKind::Fact => write!(f, "fact"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Importance::High => write!(f, "high"),
            Importance::Medium => write!(f, "medium"),
            Importance::Low => write!(f, "low"),
        }
    }
}

/// A condition (from the reference document) or a fact (from the target).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedItem {
    pub id: u32,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub importance: Option<Importance>,
}

impl ExtractedItem {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            parent_id: None,
            source: String::new(),
            importance: None,
        }
    }

    pub fn with_parent(mut self, parent_id: u32) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate id {0}")]
    DuplicateId(u32),

    #[error("item {id} references missing parent {parent_id}")]
    DanglingParent { id: u32, parent_id: u32 },

    #[error("item {0} is its own parent")]
    SelfParent(u32),

    #[error("parent chain starting at item {0} forms a cycle")]
    Cycle(u32),

    #[error("malformed batch: {0}")]
    Malformed(String),
}

/// Flat, ordered arena of extracted items. Parent links are ids resolved
/// through `index`; the forest shape is checked once in `new`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBatch {
    kind: ItemKind,
    items: Vec<ExtractedItem>,
    index: HashMap<u32, usize>,
}

impl ItemBatch {
    pub fn new(
        kind: ItemKind,
        items: Vec<ExtractedItem>,
    ) -> std::result::Result<Self, ValidationError> {
        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id, pos).is_some() {
                return Err(ValidationError::DuplicateId(item.id));
            }
        }

        for item in &items {
            match item.parent_id {
                Some(parent_id) if parent_id == item.id => {
                    return Err(ValidationError::SelfParent(item.id));
                }
                Some(parent_id) if !index.contains_key(&parent_id) => {
                    return Err(ValidationError::DanglingParent {
                        id: item.id,
                        parent_id,
                    });
                }
                _ => {}
            }
        }

        // A chain longer than the batch must revisit an item.
        for item in &items {
            let mut steps = 0;
            let mut cursor = item.parent_id;
            while let Some(parent_id) = cursor {
                steps += 1;
                if steps > items.len() {
                    return Err(ValidationError::Cycle(item.id));
                }
                cursor = items[index[&parent_id]].parent_id;
            }
        }

        Ok(Self { kind, items, index })
    }

    pub fn empty(kind: ItemKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractedItem> {
        self.items.iter()
    }

    pub fn items(&self) -> &[ExtractedItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ExtractedItem> {
        self.items
    }

    pub fn get(&self, id: u32) -> Option<&ExtractedItem> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    pub fn parent(&self, id: u32) -> Option<&ExtractedItem> {
        self.get(id)
            .and_then(|item| item.parent_id)
            .and_then(|parent_id| self.get(parent_id))
    }

    /// Number of ancestors; roots are at depth 0.
    pub fn depth(&self, id: u32) -> usize {
        let mut depth = 0;
        let mut cursor = self.get(id).and_then(|item| item.parent_id);
        while let Some(parent_id) = cursor {
            depth += 1;
            cursor = self.get(parent_id).and_then(|item| item.parent_id);
        }
        depth
    }

    /// Renders items one per line, indented by depth, for prompts.
    pub fn to_prompt_list(&self) -> String {
        self.items
            .iter()
            .map(|item| {
                format!(
                    "{}- [{}] {}",
                    "  ".repeat(self.depth(item.id)),
                    item.id,
                    item.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
