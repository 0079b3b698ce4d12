use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::item::{ExtractedItem, ItemBatch, ItemKind};

/// JSON file holding one extracted batch, in the extraction output format.
pub struct ItemStore {
    path: PathBuf,
}

impl ItemStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, batch: &ItemBatch) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(batch.items())?;
        std::fs::write(&self.path, json)?;

        tracing::info!(
            "Saved {} {} to {}",
            batch.len(),
            batch.kind().plural(),
            self.path.display()
        );
        Ok(())
    }

    /// Reads the file back and re-validates it as a batch of `kind`.
    pub fn load(&self, kind: ItemKind) -> Result<ItemBatch> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!(
                "Cannot read existing {} from {}: {}",
                kind.plural(),
                self.path.display(),
                e
            ))
        })?;

        let items: Vec<ExtractedItem> = serde_json::from_str(&contents)?;
        let batch = ItemBatch::new(kind, items).map_err(|e| Error::validation(e, contents))?;

        tracing::info!(
            "Loaded {} {} from {}",
            batch.len(),
            kind.plural(),
            self.path.display()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::{Importance, ValidationError};
    use tempfile::TempDir;

    fn batch() -> ItemBatch {
        ItemBatch::new(
            ItemKind::Condition,
            vec![
                ExtractedItem::new(1, "Lists risks")
                    .with_source("ref.md")
                    .with_importance(Importance::High),
                ExtractedItem::new(2, "Names an owner").with_parent(1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ItemStore::new(dir.path().join("out").join("conditions_output.json"));
        assert!(!store.exists());

        store.save(&batch()).unwrap();
        assert!(store.exists());

        let loaded = store.load(ItemKind::Condition).unwrap();
        assert_eq!(loaded, batch());
    }

    #[test]
    fn test_saved_format_matches_extraction_output() {
        let dir = TempDir::new().unwrap();
        let store = ItemStore::new(dir.path().join("c.json"));
        store.save(&batch()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value[0]["importance"], "high");
        assert_eq!(value[1]["parent_id"], 1);
        assert!(value[0]["parent_id"].is_null());
    }

    #[test]
    fn test_load_revalidates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facts.json");
        std::fs::write(&path, r#"[{"id": 1, "text": "a", "parent_id": 3}]"#).unwrap();

        let err = ItemStore::new(&path).load(ItemKind::Fact).unwrap_err();
        assert!(matches!(
            err,
            Error::ExtractionValidation {
                source: ValidationError::DanglingParent { id: 1, parent_id: 3 },
                ..
            }
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ItemStore::new("/nonexistent/facts.json")
            .load(ItemKind::Fact)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
