//! Error types for epigraph.

/// Alias for Results returning [`EpigraphError`].
pub type Result<T> = std::result::Result<T, EpigraphError>;

/// Top-level error type for epigraph.
#[derive(Debug, thiserror::Error)]
pub enum EpigraphError {
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedder error: {0}")]
    Embedder(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No JSON span could be located in a model response.
    #[error("model output for {context} contains no JSON object")]
    ModelOutput { context: &'static str },

    /// A JSON span was located but did not match the expected shape.
    #[error("model output for {context} failed validation: {message} (excerpt: {excerpt})")]
    ModelValidation {
        context: &'static str,
        message: String,
        excerpt: String,
    },

    /// A named ingestion step failed ("extraction failed", "failed to save episode", …).
    #[error("{0}")]
    Ingestion(String),

    /// Aggregated per-item failures from a bulk path.
    #[error("bulk operation failed: {0:?}")]
    Bulk(Vec<String>),
}

/// LLM-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited")]
    RateLimit,

    #[error("Model refused to respond")]
    Refusal,

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("API error: HTTP {status} — {message}")]
    Api { status: u16, message: String },
}
