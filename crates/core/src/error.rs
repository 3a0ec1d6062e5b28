use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors a pipeline run can terminate with.
///
/// Every variant maps to a stable error code surfaced on the job row via
/// [`PipelineError::code`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("PARSE_FAILED: {0}")]
    ParseFailed(String),

    #[error("DOC_TOO_LARGE: {0}")]
    DocTooLarge(String),

    #[error("LLM_API_ERROR ({status}): {detail}")]
    LlmApi { status: u16, detail: String },

    #[error("LLM_OUTPUT_INVALID: {0}")]
    LlmOutputInvalid(String),

    #[error("CITATION_INCOMPLETE: {0}")]
    CitationIncomplete(String),

    #[error("QUALITY_GATE_FAILED: {0}")]
    QualityGateFailed(String),

    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    #[error("JOB_NOT_FOUND: {0}")]
    JobNotFound(String),

    /// Anything the pipeline cannot classify more precisely: transport
    /// failures, database errors, panicked tasks.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Stable error code recorded on the failed job.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseFailed(_) => "PARSE_FAILED",
            Self::DocTooLarge(_) => "DOC_TOO_LARGE",
            Self::LlmApi { .. } => "LLM_API_ERROR",
            Self::LlmOutputInvalid(_) => "LLM_OUTPUT_INVALID",
            Self::CitationIncomplete(_) => "CITATION_INCOMPLETE",
            Self::QualityGateFailed(_) => "QUALITY_GATE_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::Other(msg) => classify_message(msg),
        }
    }

    /// Human-readable detail without the code prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::ParseFailed(d)
            | Self::DocTooLarge(d)
            | Self::LlmOutputInvalid(d)
            | Self::CitationIncomplete(d)
            | Self::QualityGateFailed(d)
            | Self::Storage(d)
            | Self::JobNotFound(d)
            | Self::Other(d) => d.clone(),
            Self::LlmApi { status, detail } => format!("({status}): {detail}"),
        }
    }
}

/// Classify an opaque error message by prefix: LLM markers are preserved,
/// everything else counts as a timeout-class infrastructure failure.
pub fn classify_message(msg: &str) -> &'static str {
    if msg.starts_with("LLM_API_ERROR") {
        "LLM_API_ERROR"
    } else if msg.starts_with("LLM_OUTPUT_INVALID") {
        "LLM_OUTPUT_INVALID"
    } else {
        "GEN_TIMEOUT"
    }
}

impl From<slideforge_db::DbError> for PipelineError {
    fn from(err: slideforge_db::DbError) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<slideforge_storage::StorageError> for PipelineError {
    fn from(err: slideforge_storage::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PipelineError::ParseFailed("x".into()).code(), "PARSE_FAILED");
        assert_eq!(
            PipelineError::LlmApi {
                status: 500,
                detail: "boom".into()
            }
            .code(),
            "LLM_API_ERROR"
        );
        assert_eq!(
            PipelineError::QualityGateFailed("coverage=0.5".into()).code(),
            "QUALITY_GATE_FAILED"
        );
    }

    #[test]
    fn test_classify_unknown_messages() {
        assert_eq!(classify_message("LLM_API_ERROR (429): slow down"), "LLM_API_ERROR");
        assert_eq!(
            classify_message("LLM_OUTPUT_INVALID: bad json"),
            "LLM_OUTPUT_INVALID"
        );
        assert_eq!(classify_message("connection reset by peer"), "GEN_TIMEOUT");
        assert_eq!(
            PipelineError::Other("request timed out".into()).code(),
            "GEN_TIMEOUT"
        );
    }

    #[test]
    fn test_detail_strips_code_prefix() {
        let err = PipelineError::DocTooLarge("pages=300".into());
        assert_eq!(err.detail(), "pages=300");
        assert_eq!(err.to_string(), "DOC_TOO_LARGE: pages=300");
    }
}
