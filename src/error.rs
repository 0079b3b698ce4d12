use thiserror::Error;

use crate::models::item::ValidationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Template error: no value supplied for placeholder '{{{0}}}'")]
    Template(String),

    #[error("LLM unavailable: {0}")]
    LLMUnavailable(String),

    #[error("LLM request timed out after {0} seconds")]
    LLMTimeout(u64),

    #[error("Extraction validation failed: {source}")]
    ExtractionValidation {
        source: ValidationError,
        raw_response: String,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown LLM provider '{0}'")]
    UnknownProvider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LLMUnavailable(_) | Error::LLMTimeout(_))
    }

    /// Maps a reqwest failure onto the gateway's transport taxonomy.
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Error::LLMTimeout(timeout_secs)
        } else {
            Error::LLMUnavailable(err.to_string())
        }
    }

    pub(crate) fn validation(source: ValidationError, raw_response: impl Into<String>) -> Self {
        Error::ExtractionValidation {
            source,
            raw_response: raw_response.into(),
        }
    }
}
