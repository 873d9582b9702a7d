//! Prompt-based reranker over any [`LlmClient`].

use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::errors::Result;
use crate::utils::text::truncate_with_ellipsis;

use super::{LlmClient, RerankerClient};

/// Maximum characters of each document shown to the model.
const DOC_PREVIEW_LEN: usize = 200;

static INDEX_RE: OnceLock<Regex> = OnceLock::new();

fn index_re() -> &'static Regex {
    INDEX_RE.get_or_init(|| Regex::new(r"\d+").expect("static regex is valid"))
}

/// Reranker that asks the language model for a relevance ordering.
///
/// Falls back to identity order when the model call fails; malformed output
/// degrades gracefully because callers treat the indices as advisory.
pub struct SimpleLlmReranker<L> {
    llm: Arc<L>,
}

impl<L: LlmClient> SimpleLlmReranker<L> {
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }

    fn build_prompt(query: &str, docs: &[String]) -> String {
        let mut doc_list = String::new();
        for (i, doc) in docs.iter().enumerate() {
            doc_list.push_str(&format!(
                "[{i}] {}\n",
                truncate_with_ellipsis(doc, DOC_PREVIEW_LEN)
            ));
        }

        format!(
            "You are a search relevance optimization system.\n\
             Query: {query}\n\n\
             Documents:\n{doc_list}\n\
             Rank the documents above based on their relevance to the query.\n\
             Output ONLY the indices of the documents in order of relevance, separated by commas.\n\
             Example: 0, 2, 1\n\
             Do not output any other text."
        )
    }
}

impl<L: LlmClient> RerankerClient for SimpleLlmReranker<L> {
    async fn rank(&self, query: &str, docs: &[String]) -> Result<Vec<usize>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        if docs.len() == 1 {
            return Ok(vec![0]);
        }

        let prompt = Self::build_prompt(query, docs);

        match self.llm.generate(&prompt).await {
            Ok(response) => Ok(parse_indices(&response)),
            Err(e) => {
                warn!(error = %e, "reranker LLM call failed, keeping original order");
                Ok((0..docs.len()).collect())
            }
        }
    }
}

/// Pull every non-negative integer out of the model's response, in order.
fn parse_indices(s: &str) -> Vec<usize> {
    index_re()
        .find_iter(s)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;

    fn docs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_rank_parses_comma_separated_indices() {
        let llm = Arc::new(MockLlm::with_responses(&["2, 0, 1"]));
        let reranker = SimpleLlmReranker::new(llm);

        let indices = reranker
            .rank("query", &docs(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_rank_empty_docs_returns_empty() {
        let llm = Arc::new(MockLlm::default());
        let reranker = SimpleLlmReranker::new(llm.clone());

        let indices = reranker.rank("query", &[]).await.unwrap();
        assert!(indices.is_empty());
        // No model call for trivial input.
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_rank_single_doc_is_identity_without_model_call() {
        let llm = Arc::new(MockLlm::default());
        let reranker = SimpleLlmReranker::new(llm.clone());

        let indices = reranker.rank("query", &docs(&["only"])).await.unwrap();
        assert_eq!(indices, vec![0]);
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_rank_llm_error_falls_back_to_identity() {
        // MockLlm with no queue and no fallback errors every call.
        let llm = Arc::new(MockLlm::default());
        let reranker = SimpleLlmReranker::new(llm);

        let indices = reranker
            .rank("query", &docs(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_rank_prompt_truncates_long_docs() {
        let llm = Arc::new(MockLlm::with_responses(&["0, 1"]));
        let reranker = SimpleLlmReranker::new(llm.clone());

        let long_doc = "x".repeat(500);
        reranker
            .rank("query", &docs(&[&long_doc, "short"]))
            .await
            .unwrap();

        let prompts = llm.prompts();
        assert!(!prompts[0].contains(&long_doc));
        assert!(prompts[0].contains("..."));
    }

    #[test]
    fn test_parse_indices_ignores_prose() {
        assert_eq!(parse_indices("The order is: 3, then 1, then 0."), vec![3, 1, 0]);
        assert_eq!(parse_indices("no numbers here"), Vec::<usize>::new());
    }
}
