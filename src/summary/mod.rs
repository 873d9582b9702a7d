//! Incremental entity summaries and map-reduce community summarization.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::errors::{EpigraphError, Result};
use crate::llm_client::LlmClient;
use crate::nodes::entity::EntityNode;
use crate::types::SummaryPrompts;
use crate::utils::json::parse_llm_json;
use crate::utils::text::fill_template;

/// Community summarization chunk size: at most this many member summaries go
/// into one model call. Larger communities are reduced level by level.
const CHUNK_SIZE: usize = 20;

/// Returned when every chunk of a community failed to summarize.
const FAILED_SUMMARY: &str = "Failed to generate summary.";

/// Returned when no community member has a summary to work from.
const EMPTY_SUMMARY: &str = "No significant information.";

#[derive(Debug, Deserialize)]
struct EntitySummary {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct CommunityName {
    name: String,
}

/// Produces entity and community summaries via the language model.
pub struct Summarizer<L> {
    llm: Arc<L>,
    prompts: SummaryPrompts,
}

impl<L: LlmClient> Summarizer<L> {
    pub fn new(llm: Arc<L>, prompts: SummaryPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Fold new fact mentions into an entity's summary. The returned string
    /// replaces the prior summary.
    pub async fn summarize_node(
        &self,
        node: &EntityNode,
        new_mentions: &[String],
    ) -> Result<String> {
        let mut mentions_list = String::new();
        for mention in new_mentions {
            mentions_list.push_str(&format!("- {mention}\n"));
        }

        let prompt = fill_template(&self.prompts.nodes, &[&node.summary, &mentions_list]);

        let response = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| EpigraphError::Ingestion(format!("failed to generate summary: {e}")))?;

        let result: EntitySummary = parse_llm_json("entity summary", &response)?;
        Ok(result.summary)
    }

    /// Summarize a community of entities.
    ///
    /// Base case (≤ 20 members): one model call over "name: summary" lines.
    /// Larger communities are split into fixed-size chunks, each chunk
    /// summarized, and the chunk summaries wrapped in synthetic "Part N"
    /// nodes for the next reduction level. Individual chunk failures are
    /// tolerated; if a whole level fails the sentinel text is returned.
    pub async fn summarize_community(&self, nodes: &[EntityNode]) -> Result<String> {
        let mut level: Vec<EntityNode> = nodes.to_vec();

        loop {
            if level.len() <= CHUNK_SIZE {
                return self.summarize_chunk(&level).await;
            }

            let mut part_summaries = Vec::new();
            for chunk in level.chunks(CHUNK_SIZE) {
                match self.summarize_chunk(chunk).await {
                    Ok(summary) => part_summaries.push(summary),
                    Err(e) => {
                        warn!(error = %e, "community chunk summarization failed, skipping chunk");
                    }
                }
            }

            if part_summaries.is_empty() {
                return Ok(FAILED_SUMMARY.to_string());
            }

            level = part_summaries
                .into_iter()
                .enumerate()
                .map(|(i, summary)| {
                    let mut part =
                        EntityNode::new(String::new(), format!("Part {}", i + 1), "", chrono::Utc::now());
                    part.summary = summary;
                    part
                })
                .collect();
        }
    }

    async fn summarize_chunk(&self, nodes: &[EntityNode]) -> Result<String> {
        let mut member_lines = String::new();
        for node in nodes {
            if !node.summary.is_empty() {
                member_lines.push_str(&format!("- {}: {}\n", node.name, node.summary));
            }
        }
        if member_lines.is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }

        let prompt = fill_template(&self.prompts.communities, &[member_lines.as_str()]);
        let response = self.llm.generate(&prompt).await.map_err(|e| {
            EpigraphError::Ingestion(format!("failed to generate community summary: {e}"))
        })?;

        // Accept the raw text as the summary when it isn't the expected JSON.
        match parse_llm_json::<EntitySummary>("community summary", &response) {
            Ok(result) => Ok(result.summary),
            Err(_) => Ok(response),
        }
    }

    /// Name a community from its summary. `None` when no naming template is
    /// configured; bare-string responses are accepted as the name.
    pub async fn community_name(&self, summary: &str) -> Result<Option<String>> {
        if self.prompts.community_name.is_empty() {
            return Ok(None);
        }

        let prompt = fill_template(&self.prompts.community_name, &[summary]);
        let response = self.llm.generate(&prompt).await.map_err(|e| {
            EpigraphError::Ingestion(format!("failed to generate community name: {e}"))
        })?;

        match parse_llm_json::<CommunityName>("community name", &response) {
            Ok(result) => Ok(Some(result.name)),
            Err(_) => Ok(Some(response)),
        }
    }
}
