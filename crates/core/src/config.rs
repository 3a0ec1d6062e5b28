use serde::{Deserialize, Serialize};

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Documents with more pages than this fail with `DOC_TOO_LARGE` (default: 200).
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Estimated-token budget per chunk (default: 1200).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: u32,

    /// Reserved for overlapping adjacent chunks; the chunker does not apply
    /// it yet (default: 120).
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_tokens: u32,

    /// Fuzzy dedupe similarity threshold in [0, 1] (default: 0.86).
    #[serde(default = "default_dedupe_threshold")]
    pub dedupe_threshold: f64,

    /// Minimum fact-coverage ratio the quality gate accepts (default: 0.85).
    #[serde(default = "default_coverage_threshold")]
    pub quality_coverage_threshold: f64,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_max_pages() -> u32 {
    200
}

fn default_chunk_size() -> u32 {
    1200
}

fn default_chunk_overlap() -> u32 {
    120
}

fn default_dedupe_threshold() -> f64 {
    0.86
}

fn default_coverage_threshold() -> f64 {
    0.85
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            chunk_size_tokens: default_chunk_size(),
            chunk_overlap_tokens: default_chunk_overlap(),
            dedupe_threshold: default_dedupe_threshold(),
            quality_coverage_threshold: default_coverage_threshold(),
            llm: LlmConfig::default(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider kind: `openai` (any OpenAI-compatible endpoint), `anthropic`,
    /// or `mock`. Unknown values fall back to the OpenAI-compatible wire
    /// format.
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: String,

    /// Base URL for OpenAI-compatible providers.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,

    /// Anthropic auth token; falls back to `api_key` when empty.
    #[serde(default)]
    pub anthropic_auth_token: String,

    /// Per-request timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries after the first failed attempt (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "stepfun/step-3.5-flash:free".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            base_url: default_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            anthropic_version: default_anthropic_version(),
            anthropic_auth_token: String::new(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}
