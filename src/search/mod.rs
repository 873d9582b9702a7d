//! Hybrid retrieval over entity-edge facts.
//!
//! Vector cosine ranking when an embedder is available, substring matching
//! otherwise, followed by an optional LLM rerank. Vector index availability
//! is environment-dependent; degrading to lexical search is silent, never an
//! error.

use std::collections::HashMap;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::driver::GraphDriver;
use crate::edges::entity::EntityEdge;
use crate::embedder::EmbedderClient;
use crate::errors::{EpigraphError, Result};
use crate::llm_client::{LlmClient, RerankerClient};
use crate::pipeline::Epigraph;

/// One query of a bulk search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSearchQuery {
    pub query_id: String,
    pub query: String,
}

impl<D, L, E, R> Epigraph<D, L, E, R>
where
    D: GraphDriver,
    L: LlmClient,
    E: EmbedderClient,
    R: RerankerClient,
{
    /// Hybrid search over the group's active facts.
    ///
    /// Embeds the query when an embedder is installed; the repository then
    /// ranks by in-store cosine similarity, or falls back to substring
    /// matching without a vector. With a reranker and at least two results,
    /// the facts are reranked; reranker errors preserve the original order.
    pub async fn search(&self, group_id: &str, query: &str) -> Result<Vec<EntityEdge>> {
        let mut query_vector = None;
        if let Some(embedder) = &self.embedder {
            match embedder.embed(query).await {
                Ok(vector) => query_vector = Some(vector),
                Err(e) => warn!(error = %e, "query embedding failed, using lexical search"),
            }
        }

        let edges = match &query_vector {
            Some(vector) => self.repo.vector_match_edges(group_id, vector).await,
            None => self.repo.text_match_edges(group_id, query).await,
        }
        .map_err(|e| EpigraphError::Search(format!("search failed: {e}")))?;

        let Some(reranker) = &self.reranker else {
            return Ok(edges);
        };
        if edges.len() < 2 {
            return Ok(edges);
        }

        let facts: Vec<String> = edges.iter().map(|edge| edge.fact.clone()).collect();
        match reranker.rank(query, &facts).await {
            Ok(indices) => Ok(apply_ranking(edges, &indices)),
            Err(e) => {
                warn!(error = %e, "rerank failed, keeping original order");
                Ok(edges)
            }
        }
    }

    /// Run many searches concurrently, bounded by `concurrency.bulk_search`.
    /// Returns results keyed by query id; per-query failures aggregate into
    /// one error naming the failing queries.
    pub async fn bulk_search(
        &self,
        group_id: &str,
        queries: &[BulkSearchQuery],
    ) -> Result<HashMap<String, Vec<EntityEdge>>> {
        let limit = self.config.concurrency.bulk_search.max(1);
        let semaphore = Semaphore::new(limit);

        let outcomes = join_all(queries.iter().map(|query| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                let result = self.search(group_id, &query.query).await;
                (query.query_id.clone(), result)
            }
        }))
        .await;

        let mut results = HashMap::new();
        let mut errors = Vec::new();
        for (query_id, outcome) in outcomes {
            match outcome {
                Ok(edges) => {
                    results.insert(query_id, edges);
                }
                Err(e) => errors.push(format!("query {query_id}: {e}")),
            }
        }
        if !errors.is_empty() {
            errors.sort();
            return Err(EpigraphError::Bulk(errors));
        }

        Ok(results)
    }
}

/// Reorder `edges` by the reranker's indices.
///
/// Out-of-range and duplicate indices are ignored; edges the reranker did not
/// reference are appended in their original order. The output is always a
/// permutation of the input.
pub fn apply_ranking(edges: Vec<EntityEdge>, indices: &[usize]) -> Vec<EntityEdge> {
    if indices.is_empty() {
        return edges;
    }

    let mut taken = vec![false; edges.len()];
    let mut order = Vec::with_capacity(edges.len());
    for &index in indices {
        if index < edges.len() && !taken[index] {
            taken[index] = true;
            order.push(index);
        }
    }
    for (index, was_taken) in taken.iter().enumerate() {
        if !was_taken {
            order.push(index);
        }
    }

    let mut slots: Vec<Option<EntityEdge>> = edges.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}
