use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_PROVIDER: &str = "gemini";

/// Sampling and model options handed to a provider on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOptions {
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f32>,
    #[serde(default = "default_top_k")]
    pub top_k: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_top_p() -> Option<f32> {
    Some(0.95)
}

fn default_top_k() -> Option<u32> {
    Some(40)
}

impl LlmOptions {
    pub fn for_model(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
            top_k: default_top_k(),
        }
    }

    /// Built-in defaults for the providers shipped with the crate.
    pub fn provider_default(provider: &str) -> Self {
        match provider {
            "claude" => Self::for_model("claude-sonnet-4-20250514"),
            "openai" => Self::for_model("gpt-4o"),
            _ => Self::for_model("gemini-2.0-flash"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Each condition is judged against the whole fact set at once.
    #[default]
    AllFacts,
    /// Each condition is judged against every fact separately.
    EachFact,
}

/// Prompt template overrides; paths are relative to the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PromptPaths {
    pub default_analysis: Option<PathBuf>,
    pub pair_check: Option<PathBuf>,
    pub should_extract: Option<PathBuf>,
    pub condition_extraction: Option<PathBuf>,
    pub fact_extraction: Option<PathBuf>,
}

impl PromptPaths {
    fn resolve_against(self, base: &Path) -> Self {
        let resolve = |p: Option<PathBuf>| {
            p.map(|p| if p.is_absolute() { p } else { base.join(p) })
        };
        Self {
            default_analysis: resolve(self.default_analysis),
            pair_check: resolve(self.pair_check),
            should_extract: resolve(self.should_extract),
            condition_extraction: resolve(self.condition_extraction),
            fact_extraction: resolve(self.fact_extraction),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LlmSection {
    default: Option<String>,
    #[serde(default)]
    models: HashMap<String, LlmOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PipelineSection {
    file_head_chars: Option<usize>,
    max_context_chars: Option<usize>,
    max_chunk_tokens: Option<usize>,
    concurrency_limit: Option<usize>,
    pairing: Option<PairingPolicy>,
    show_progress: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GatewaySection {
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    llm: LlmSection,
    #[serde(default)]
    prompts: PromptPaths,
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    gateway: GatewaySection,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub openai: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            anthropic: read("ANTHROPIC_API_KEY"),
            gemini: read("GEMINI_API_KEY"),
            openai: read("OPENAI_API_KEY"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub default_llm: String,
    pub models: HashMap<String, LlmOptions>,
    pub prompts: PromptPaths,
    pub api_keys: ApiKeys,
    pub file_head_chars: usize,
    pub max_context_chars: usize,
    pub max_chunk_tokens: usize,
    pub concurrency_limit: usize,
    pub pairing: PairingPolicy,
    pub show_progress: bool,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_llm: DEFAULT_PROVIDER.to_string(),
            models: HashMap::new(),
            prompts: PromptPaths::default(),
            api_keys: ApiKeys::default(),
            file_head_chars: 1000,
            max_context_chars: 8000,
            max_chunk_tokens: 8000,
            concurrency_limit: 4,
            pairing: PairingPolicy::AllFacts,
            show_progress: true,
            max_retries: 1,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Environment-only configuration (no YAML file).
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Loads the optional YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!(
                        "Cannot read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                Self::from_yaml(&contents, base)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses YAML without touching the environment.
    pub fn from_yaml(contents: &str, base_dir: &Path) -> Result<Self> {
        let file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        let defaults = Self::default();

        let concurrency_limit = file
            .pipeline
            .concurrency_limit
            .unwrap_or(defaults.concurrency_limit);
        if concurrency_limit == 0 {
            return Err(Error::Config(
                "pipeline.concurrency_limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            default_llm: file.llm.default.unwrap_or(defaults.default_llm),
            models: file.llm.models,
            prompts: file.prompts.resolve_against(base_dir),
            api_keys: ApiKeys::default(),
            file_head_chars: file
                .pipeline
                .file_head_chars
                .unwrap_or(defaults.file_head_chars),
            max_context_chars: file
                .pipeline
                .max_context_chars
                .unwrap_or(defaults.max_context_chars),
            max_chunk_tokens: file
                .pipeline
                .max_chunk_tokens
                .unwrap_or(defaults.max_chunk_tokens),
            concurrency_limit,
            pairing: file.pipeline.pairing.unwrap_or(defaults.pairing),
            show_progress: file
                .pipeline
                .show_progress
                .unwrap_or(defaults.show_progress),
            max_retries: file.gateway.max_retries.unwrap_or(defaults.max_retries),
            timeout_secs: file.gateway.timeout_secs.unwrap_or(defaults.timeout_secs),
        })
    }

    fn apply_env_overrides(&mut self) {
        self.api_keys = ApiKeys::from_env();

        if let Ok(name) = env::var("DOCANALYZER_LLM") {
            if !name.trim().is_empty() {
                self.default_llm = name.trim().to_lowercase();
            }
        }

        for (provider, var) in [
            ("claude", "CLAUDE_MODEL_NAME"),
            ("gemini", "GEMINI_MODEL_NAME"),
            ("openai", "OPENAI_MODEL_NAME"),
        ] {
            if let Ok(model_name) = env::var(var) {
                self.models
                    .entry(provider.to_string())
                    .or_insert_with(|| LlmOptions::provider_default(provider))
                    .model_name = model_name;
            }
        }
    }

    pub fn llm_options(&self, provider: &str) -> LlmOptions {
        self.models
            .get(provider)
            .cloned()
            .unwrap_or_else(|| LlmOptions::provider_default(provider))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub file_head_chars: usize,
    pub max_context_chars: usize,
    pub max_chunk_tokens: usize,
    pub concurrency_limit: usize,
    pub pairing: PairingPolicy,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            file_head_chars: config.file_head_chars,
            max_context_chars: config.max_context_chars,
            max_chunk_tokens: config.max_chunk_tokens,
            concurrency_limit: config.concurrency_limit,
            pairing: config.pairing,
            show_progress: config.show_progress,
        }
    }
}
