pub mod anthropic;
pub mod openai;
pub mod prompts;

use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Classification of an extracted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactType {
    Definition,
    Claim,
    Method,
    Result,
    Limitation,
    Formula,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Claim => "claim",
            Self::Method => "method",
            Self::Result => "result",
            Self::Limitation => "limitation",
            Self::Formula => "formula",
        }
    }

    /// Parse a lowercased type name; anything outside the set is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "definition" => Some(Self::Definition),
            "claim" => Some(Self::Claim),
            "method" => Some(Self::Method),
            "result" => Some(Self::Result),
            "limitation" => Some(Self::Limitation),
            "formula" => Some(Self::Formula),
            _ => None,
        }
    }
}

/// A slide-suitable atomic statement extracted from a source chunk (or
/// synthesized from a formula image).
#[derive(Debug, Clone)]
pub struct FactCandidate {
    pub fact_id: String,
    pub chunk_id: String,
    pub statement: String,
    pub fact_type: FactType,
    pub importance: f64,
}

/// One slide: a heading plus references into the fact list.
#[derive(Debug, Clone, Deserialize)]
pub struct OutlineSubsection {
    pub heading: String,
    pub fact_indices: Vec<usize>,
}

/// A deck section grouping one to five slides.
#[derive(Debug, Clone, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    #[serde(default)]
    pub summary_note: String,
    pub subsections: Vec<OutlineSubsection>,
}

/// Two-level grouping of fact indices into sections and slides.
#[derive(Debug, Clone, Deserialize)]
pub struct Outline {
    pub sections: Vec<OutlineSection>,
}

/// Input to annotation writing: the outline with bullet texts resolved.
#[derive(Debug, Clone)]
pub struct SubsectionDraft {
    pub heading: String,
    pub bullet_texts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SectionDraft {
    pub heading: String,
    pub subsections: Vec<SubsectionDraft>,
}

/// Low-level chat transport. Providers only move prompts and raw text;
/// parsing and validation stay above this seam.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a system + user prompt pair, returning the raw model output.
    async fn complete(&self, system: &str, user: &str) -> PipelineResult<String>;

    /// The provider name (e.g., "openai", "anthropic").
    fn provider_name(&self) -> &str;
}

#[derive(Clone)]
enum Backend {
    Mock,
    Chat(Arc<dyn ChatProvider>),
}

/// Gateway to the configured language model.
///
/// Owns a single pooled HTTP client; all three operations are idempotent and
/// safe to call from concurrent tasks.
#[derive(Clone)]
pub struct LlmClient {
    backend: Backend,
    max_retries: u32,
}

impl LlmClient {
    /// Build a client from configuration. `mock` short-circuits all network
    /// calls; `anthropic` selects the messages API; anything else speaks the
    /// OpenAI-compatible chat protocol.
    pub fn from_config(config: &LlmConfig) -> PipelineResult<Self> {
        let backend = match config.provider.to_lowercase().as_str() {
            "mock" => Backend::Mock,
            provider => {
                let http = reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                    .pool_max_idle_per_host(10)
                    .build()
                    .map_err(|e| {
                        PipelineError::Other(format!("Failed to create HTTP client: {e}"))
                    })?;
                let chat: Arc<dyn ChatProvider> = if provider == "anthropic" {
                    Arc::new(anthropic::AnthropicProvider::new(http, config))
                } else {
                    Arc::new(openai::OpenAiProvider::new(http, config))
                };
                Backend::Chat(chat)
            }
        };
        Ok(Self {
            backend,
            max_retries: config.max_retries,
        })
    }

    /// A client that fabricates deterministic output without any network.
    pub fn mock() -> Self {
        Self {
            backend: Backend::Mock,
            max_retries: 0,
        }
    }

    /// A client over an explicit transport (used by tests and embedders).
    pub fn with_provider(provider: Arc<dyn ChatProvider>, max_retries: u32) -> Self {
        Self {
            backend: Backend::Chat(provider),
            max_retries,
        }
    }

    // ---- fact extraction ----

    /// Extract up to 8 fact candidates from one chunk of text.
    pub async fn extract_facts(
        &self,
        chunk_id: &str,
        text: &str,
    ) -> PipelineResult<Vec<FactCandidate>> {
        let provider = match &self.backend {
            Backend::Mock => return Ok(mock_extract(chunk_id, text)),
            Backend::Chat(p) => p,
        };

        let (system, user) = prompts::fact_prompts(text);
        let mut last_error: Option<PipelineError> = None;
        for _ in 0..=self.max_retries {
            let attempt = async {
                let raw = provider.complete(&system, &user).await?;
                let items = parse_fact_items(&raw)?;
                let facts: Vec<FactCandidate> = items
                    .into_iter()
                    .take(8)
                    .enumerate()
                    .map(|(idx, item)| FactCandidate {
                        fact_id: format!("f_{chunk_id}_{}", idx + 1),
                        chunk_id: chunk_id.to_string(),
                        statement: item.statement,
                        fact_type: item.fact_type,
                        importance: item.importance,
                    })
                    .collect();
                if facts.is_empty() {
                    return Err(PipelineError::LlmOutputInvalid(
                        "no facts returned".to_string(),
                    ));
                }
                Ok(facts)
            };
            match attempt.await {
                Ok(facts) => return Ok(facts),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| PipelineError::LlmOutputInvalid("unknown llm failure".into())))
    }

    // ---- outline building ----

    /// Group facts into a deck outline; fact indices are validated against
    /// the input and unused indices are appended to the final subsection.
    pub async fn build_outline(
        &self,
        facts: &[FactCandidate],
        language: &str,
    ) -> PipelineResult<Outline> {
        let provider = match &self.backend {
            Backend::Mock => return Ok(mock_outline(facts)),
            Backend::Chat(p) => p,
        };

        let (system, user) = prompts::outline_prompts(facts, language);
        let mut last_error: Option<PipelineError> = None;
        for _ in 0..=self.max_retries {
            let attempt = async {
                let raw = provider.complete(&system, &user).await?;
                parse_outline(&raw, facts.len())
            };
            match attempt.await {
                Ok(outline) => return Ok(outline),
                Err(e) => {
                    tracing::warn!("build_outline attempt failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::LlmOutputInvalid("outline generation failed".into())
        }))
    }

    // ---- annotation writing ----

    /// Write one speaker note per subsection, indexed by subsection order.
    /// Best-effort: any failure yields empty strings.
    pub async fn write_annotations(
        &self,
        sections: &[SectionDraft],
        language: &str,
    ) -> Vec<String> {
        let total: usize = sections.iter().map(|s| s.subsections.len()).sum();

        let provider = match &self.backend {
            Backend::Mock => {
                return vec!["Key concepts and their implications.".to_string(); total];
            }
            Backend::Chat(p) => p,
        };

        let (system, user) = prompts::annotation_prompts(sections, language);
        let attempt = async {
            let raw = provider.complete(&system, &user).await?;
            let value = parse_json_value(&raw)?;
            let resp: AnnotationsResponse = serde_json::from_value(value).map_err(|e| {
                PipelineError::LlmOutputInvalid(format!("invalid annotations schema: {e}"))
            })?;
            let mut result = vec![String::new(); total];
            for item in resp.annotations {
                if item.subsection_index >= 0 && (item.subsection_index as usize) < total {
                    result[item.subsection_index as usize] = item.annotation;
                }
            }
            Ok::<_, PipelineError>(result)
        };

        match attempt.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("write_annotations failed, falling back to empty: {e}");
                vec![String::new(); total]
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnnotationItem {
    subsection_index: i64,
    #[serde(default)]
    annotation: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationsResponse {
    annotations: Vec<AnnotationItem>,
}

// ---- JSON recovery ----

/// Strip Markdown code fences and, failing a direct parse, recover the first
/// balanced JSON object from the text.
fn extract_json_string(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(stripped) = strip_code_fence(s) {
        s = stripped;
    }

    let Some(start) = s.find('{') else {
        return s.to_string();
    };
    let mut depth = 0i32;
    for (i, ch) in s[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return s[start..start + i + 1].to_string();
                }
            }
            _ => {}
        }
    }
    s.to_string()
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let t = s.trim();
    let rest = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))?;
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}

/// Parse raw model output into a JSON value, tolerating fences and prose
/// around the object.
fn parse_json_value(content: &str) -> PipelineResult<serde_json::Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::LlmOutputInvalid(
            "empty model output".to_string(),
        ));
    }

    for candidate in [trimmed.to_string(), extract_json_string(content)] {
        if candidate.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate) {
            return Ok(value);
        }
    }

    let snippet: String = trimmed.chars().take(200).collect();
    Err(PipelineError::LlmOutputInvalid(format!(
        "cannot parse JSON. Raw snippet: {snippet:?}"
    )))
}

// ---- fact normalization ----

struct NormalizedFact {
    statement: String,
    fact_type: FactType,
    importance: f64,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Normalize loosely-shaped model output into valid fact items: statements
/// padded to 8 chars and capped at 400, unknown types demoted to `claim`,
/// importance coerced and clamped to [0, 1].
fn normalize_fact_items(parsed: &serde_json::Value) -> Vec<NormalizedFact> {
    let mut out = Vec::new();
    let Some(items) = parsed.get("facts").and_then(|v| v.as_array()) else {
        return out;
    };

    for item in items {
        let Some(obj) = item.as_object() else { continue };

        let mut statement = obj
            .get("statement")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if statement.is_empty() {
            statement = "No statement.".to_string();
        }
        if statement.chars().count() < 8 {
            statement = format!("{statement} (detail)").trim().to_string();
        }
        statement = truncate_chars(&statement, 400);

        let type_raw = obj
            .get("fact_type")
            .or_else(|| obj.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("claim")
            .to_lowercase();
        let fact_type = FactType::parse(&type_raw).unwrap_or(FactType::Claim);

        let importance = match obj.get("importance") {
            Some(v) => v
                .as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                .unwrap_or(0.5),
            None => 0.5,
        }
        .clamp(0.0, 1.0);

        out.push(NormalizedFact {
            statement,
            fact_type,
            importance,
        });
    }

    out
}

fn parse_fact_items(content: &str) -> PipelineResult<Vec<NormalizedFact>> {
    let value = parse_json_value(content)?;
    Ok(normalize_fact_items(&value))
}

// ---- outline parsing & validation ----

fn parse_outline(raw: &str, fact_count: usize) -> PipelineResult<Outline> {
    let value = parse_json_value(raw)?;
    let mut outline: Outline = serde_json::from_value(value)
        .map_err(|e| PipelineError::LlmOutputInvalid(format!("invalid outline schema: {e}")))?;

    validate_outline_shape(&outline)?;

    let mut used: HashSet<usize> = HashSet::new();
    for section in &outline.sections {
        for sub in &section.subsections {
            for &idx in &sub.fact_indices {
                if idx >= fact_count {
                    return Err(PipelineError::LlmOutputInvalid(format!(
                        "fact_index {idx} out of range [0, {fact_count})"
                    )));
                }
                if !used.insert(idx) {
                    return Err(PipelineError::LlmOutputInvalid(format!(
                        "fact_index {idx} referenced more than once"
                    )));
                }
            }
        }
    }

    // Append anything the model left out so every fact lands on a slide.
    let unused: Vec<usize> = (0..fact_count).filter(|i| !used.contains(i)).collect();
    if !unused.is_empty() {
        if let Some(sub) = outline
            .sections
            .last_mut()
            .and_then(|sec| sec.subsections.last_mut())
        {
            sub.fact_indices.extend(unused);
        }
    }

    Ok(outline)
}

fn validate_outline_shape(outline: &Outline) -> PipelineResult<()> {
    if outline.sections.is_empty() || outline.sections.len() > 15 {
        return Err(PipelineError::LlmOutputInvalid(format!(
            "outline must have 1-15 sections, got {}",
            outline.sections.len()
        )));
    }
    for section in &outline.sections {
        let heading_len = section.heading.chars().count();
        if heading_len < 2 || heading_len > 200 {
            return Err(PipelineError::LlmOutputInvalid(
                "section heading must be 2-200 chars".to_string(),
            ));
        }
        if section.subsections.is_empty() || section.subsections.len() > 5 {
            return Err(PipelineError::LlmOutputInvalid(format!(
                "section must have 1-5 subsections, got {}",
                section.subsections.len()
            )));
        }
        for sub in &section.subsections {
            let sub_len = sub.heading.chars().count();
            if sub_len < 2 || sub_len > 200 {
                return Err(PipelineError::LlmOutputInvalid(
                    "subsection heading must be 2-200 chars".to_string(),
                ));
            }
        }
    }
    Ok(())
}

// ---- mock mode ----

/// Fabricate up to 5 claims by splitting on sentence boundaries.
fn mock_extract(chunk_id: &str, text: &str) -> Vec<FactCandidate> {
    let mut out: Vec<FactCandidate> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(5)
        .enumerate()
        .map(|(idx, line)| FactCandidate {
            fact_id: format!("f_{chunk_id}_{}", idx + 1),
            chunk_id: chunk_id.to_string(),
            statement: truncate_chars(line, 240),
            fact_type: FactType::Claim,
            importance: 0.55,
        })
        .collect();

    if out.is_empty() {
        out.push(FactCandidate {
            fact_id: format!("f_{chunk_id}_1"),
            chunk_id: chunk_id.to_string(),
            statement: truncate_chars(text, 220),
            fact_type: FactType::Definition,
            importance: 0.5,
        });
    }
    out
}

/// Group facts into blocks of 4 bullets x 2 slides per section.
fn mock_outline(facts: &[FactCandidate]) -> Outline {
    const GROUP: usize = 4;
    let mut sections = Vec::new();

    let mut s_start = 0;
    while s_start < facts.len() {
        let sec_end = (s_start + GROUP * 2).min(facts.len());
        let sec_num = s_start / (GROUP * 2) + 1;

        let mut subsections = Vec::new();
        let mut ss = s_start;
        while ss < sec_end {
            let sub_end = (ss + GROUP).min(sec_end);
            subsections.push(OutlineSubsection {
                heading: format!("Topic {sec_num}.{}", (ss - s_start) / GROUP + 1),
                fact_indices: (ss..sub_end).collect(),
            });
            ss = sub_end;
        }

        sections.push(OutlineSection {
            heading: format!("Section {sec_num}"),
            summary_note: format!("Covers facts {s_start}-{}", sec_end - 1),
            subsections,
        });
        s_start = sec_end;
    }

    if sections.is_empty() {
        sections.push(OutlineSection {
            heading: "Overview".to_string(),
            summary_note: "All extracted content".to_string(),
            subsections: vec![OutlineSubsection {
                heading: "Key Points".to_string(),
                fact_indices: (0..facts.len()).collect(),
            }],
        });
    }

    Outline { sections }
}
