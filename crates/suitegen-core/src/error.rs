//! Error taxonomy for the generation pipeline.
//!
//! Every failure the pipeline can surface to a caller is one of the
//! [`PipelineError`] variants. The `Display` text is the human-readable
//! message shown to users; [`PipelineError::code`] is the stable
//! machine-readable code used in HTTP error bodies.

use thiserror::Error;

/// Failures surfaced by digesting, generation, storage and request validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The API description does not parse as its declared format.
    #[error("malformed API description: {0}")]
    MalformedSpec(String),

    /// The API description parsed but declares no endpoints.
    #[error("API description declares no endpoints")]
    EmptySpec,

    /// The text-generation backend did not answer in time.
    #[error("test generation timed out: {0}")]
    GenerationTimeout(String),

    /// The text-generation backend failed or answered with nothing usable.
    #[error("test generation failed: {0}")]
    GenerationBackend(String),

    /// No artifact is stored under the given key.
    #[error("test file not found: {0}")]
    NotFound(String),

    /// The request is missing a field or carries an invalid value.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upload exceeds the configured size limit.
    #[error("upload too large: {0}")]
    UploadTooLarge(String),

    /// The artifact store could not complete an operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Machine-readable error code (e.g. `"not_found"`).
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::MalformedSpec(_) => "malformed_spec",
            PipelineError::EmptySpec => "empty_spec",
            PipelineError::GenerationTimeout(_) => "generation_timeout",
            PipelineError::GenerationBackend(_) => "generation_backend",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::UploadTooLarge(_) => "upload_too_large",
            PipelineError::Storage(_) => "storage",
        }
    }

    /// Whether re-running the whole pipeline may succeed.
    ///
    /// Only backend failures qualify; bad input fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::GenerationTimeout(_) | PipelineError::GenerationBackend(_)
        )
    }
}

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;
