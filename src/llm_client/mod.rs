//! LLM client abstraction.
//!
//! # Implementations
//! - [`openai::OpenAiClient`] — OpenAI chat models via `async-openai`.
//! - [`reranker::SimpleLlmReranker`] — prompt-based reranking over any [`LlmClient`].
//!
//! Output is free text; the pipeline decodes it with the tolerant JSON codec
//! in [`crate::utils::json`]. Implementations must be safe for concurrent
//! calls — the bulk paths share one client across their fan-out.

pub mod openai;
pub mod reranker;

use crate::errors::Result;

/// Trait for language-model clients.
#[allow(async_fn_in_trait)]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and return the model's text response.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Trait for search-result rerankers.
#[allow(async_fn_in_trait)]
pub trait RerankerClient: Send + Sync {
    /// Rank `docs` against `query`, returning document indices in relevance
    /// order. Callers treat the result as advisory: out-of-range or duplicate
    /// indices are ignored, unreferenced documents keep their original order.
    async fn rank(&self, query: &str, docs: &[String]) -> Result<Vec<usize>>;
}
