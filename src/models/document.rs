use std::path::{Path, PathBuf};

use crate::error::Result;

/// A plain-text input document.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content: String,
}

impl Document {
    /// Reads the file as UTF-8, decoding lossily when it is not valid UTF-8.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let size_bytes = bytes.len() as u64;

        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    "{} is not valid UTF-8, decoding lossily",
                    path.display()
                );
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes,
            content,
        })
    }

    pub fn from_text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }

    /// First `max_chars` characters of the content.
    pub fn head(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}
