use serde::{Deserialize, Serialize};

/// Status of a processing job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Failed,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "done" => Self::Done,
            _ => Self::Failed,
        }
    }
}

/// Status of an ingested document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "uploaded" => Self::Uploaded,
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            _ => Self::Failed,
        }
    }
}

/// A source document owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub language: Option<String>,
    pub pages: Option<u32>,
    pub status: DocumentStatus,
    pub file_key: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A pipeline run over a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub metrics: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// An embedded image extracted from a document and uploaded to blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentImage {
    pub id: String,
    pub document_id: String,
    pub page: u32,
    pub image_index: u32,
    pub storage_key: String,
    pub width: u32,
    pub height: u32,
    pub is_formula: bool,
    pub latex: Option<String>,
}

/// Input row for [`DocumentImage`]; the id is assigned at insert.
#[derive(Debug, Clone)]
pub struct NewDocumentImage {
    pub document_id: String,
    pub page: u32,
    pub image_index: u32,
    pub storage_key: String,
    pub width: u32,
    pub height: u32,
    pub is_formula: bool,
    pub latex: Option<String>,
}

/// Top-level deck grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSection {
    pub id: String,
    pub document_id: String,
    pub heading: String,
    pub summary_note: String,
    pub sort_index: u32,
}

/// One slide within a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSubsection {
    pub id: String,
    pub section_id: String,
    pub heading: String,
    pub annotation: String,
    pub sort_index: u32,
}

/// One bullet line on a slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckBullet {
    pub id: String,
    pub subsection_id: String,
    pub text: String,
    pub sort_index: u32,
    pub image_id: Option<String>,
}

/// Link from a bullet to its evidence span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletCitation {
    pub id: String,
    pub bullet_id: String,
    pub source_span_id: String,
}

/// A locatable evidence quote in the source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpan {
    pub id: String,
    pub document_id: String,
    pub page: u32,
    pub paragraph_index: u32,
    pub quote_snippet: String,
    pub char_start: Option<u32>,
    pub char_end: Option<u32>,
}

// Input tree for transactional deck persistence. sort_index is assigned from
// the position within each parent at insert time, so persisted indices are
// always dense and 0-based.

#[derive(Debug, Clone)]
pub struct NewSpan {
    pub page: u32,
    pub paragraph_index: u32,
    pub quote_snippet: String,
    pub char_start: Option<u32>,
    pub char_end: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewBullet {
    pub text: String,
    pub image_id: Option<String>,
    pub span: Option<NewSpan>,
}

#[derive(Debug, Clone)]
pub struct NewSubsection {
    pub heading: String,
    pub annotation: String,
    pub bullets: Vec<NewBullet>,
}

#[derive(Debug, Clone)]
pub struct NewSection {
    pub heading: String,
    pub summary_note: String,
    pub subsections: Vec<NewSubsection>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDeck {
    pub sections: Vec<NewSection>,
}

/// ISO 8601 UTC timestamp, e.g. `2026-02-19T01:12:24Z`.
pub fn iso_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
