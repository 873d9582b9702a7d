//! Identity resolution and temporal contradiction handling.
//!
//! The resolver keeps the one-entity-per-referent invariant and the
//! bitemporal edge history honest: new entities are merged into existing
//! ones when the model says they co-refer, exact-duplicate facts are
//! detected before writing, and contradicted facts get their `invalid_at`
//! set instead of being removed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::errors::Result;
use crate::extraction::ExtractedEdge;
use crate::llm_client::LlmClient;
use crate::nodes::entity::EntityNode;
use crate::prompts;
use crate::repo::EdgeRef;
use crate::types::DeduplicationPrompts;
use crate::utils::json::parse_llm_json;
use crate::utils::text::fill_template;

/// A (existing, newly-extracted) co-reference pair from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DuplicatePair {
    /// The existing node's uuid.
    pub original_uuid: String,
    /// The new node's (temporary) uuid.
    pub duplicate_uuid: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeduplicationResult {
    pub duplicates: Vec<DuplicatePair>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContradictionResult {
    pub contradicted_edge_uuids: Vec<String>,
}

/// Resolves entity identity and fact-level duplicates/contradictions.
pub struct Resolver<L> {
    llm: Arc<L>,
    prompts: DeduplicationPrompts,
}

impl<L: LlmClient> Resolver<L> {
    pub fn new(llm: Arc<L>, prompts: DeduplicationPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Ask the model which new entities co-refer with existing ones.
    pub async fn find_duplicates(
        &self,
        new_nodes: &[EntityNode],
        existing_nodes: &[EntityNode],
    ) -> Result<Vec<DuplicatePair>> {
        let prompt = fill_template(
            &self.prompts.nodes,
            &[&serialize_nodes(new_nodes), &serialize_nodes(existing_nodes)],
        );

        let response = self.llm.generate(&prompt).await?;
        let result: DeduplicationResult = parse_llm_json("entity dedup", &response)?;
        Ok(result.duplicates)
    }

    /// Resolve new entities against the group's existing ones.
    ///
    /// For each duplicate pair the new entity's uuid is rewritten to the
    /// existing uuid and the existing summary inherited, so downstream
    /// summarization updates it rather than replacing it. The first mapping
    /// per duplicate wins (model output order). On resolver failure every new
    /// entity stays distinct — safe by creation, a later run may merge.
    pub async fn resolve_entities(
        &self,
        mut new_nodes: Vec<EntityNode>,
        existing_nodes: &[EntityNode],
    ) -> Vec<EntityNode> {
        let duplicates = match self.find_duplicates(&new_nodes, existing_nodes).await {
            Ok(duplicates) => duplicates,
            Err(e) => {
                warn!(error = %e, "entity resolution failed, treating extracted entities as new");
                return new_nodes;
            }
        };

        let mut mapping: HashMap<&str, &str> = HashMap::new();
        for pair in &duplicates {
            mapping
                .entry(pair.duplicate_uuid.as_str())
                .or_insert(pair.original_uuid.as_str());
        }

        for node in &mut new_nodes {
            if let Some(existing_uuid) = mapping.get(node.uuid.as_str()) {
                node.uuid = (*existing_uuid).to_string();
                if let Some(existing) = existing_nodes.iter().find(|n| n.uuid == node.uuid) {
                    node.summary = existing.summary.clone();
                }
            }
        }

        new_nodes
    }

    /// Exact fact-level duplicate: same target, relation name, and fact text
    /// among the source's active edges.
    pub fn find_exact_duplicate<'a>(
        edge: &ExtractedEdge,
        active_edges: &'a [EdgeRef],
    ) -> Option<&'a EdgeRef> {
        active_edges.iter().find(|existing| {
            existing.target_node_uuid == edge.target_node_uuid
                && existing.name == edge.relation_type
                && existing.fact == edge.fact
        })
    }

    /// Ask the model which of the existing active facts the new fact
    /// contradicts; returns the uuids of contradicted edges.
    pub async fn find_contradictions(
        &self,
        new_fact: &str,
        existing_edges: &[EdgeRef],
    ) -> Result<Vec<String>> {
        if existing_edges.is_empty() {
            return Ok(Vec::new());
        }

        let mut existing_facts = String::new();
        for edge in existing_edges {
            existing_facts.push_str(&format!("- UUID: {}, Fact: {}\n", edge.uuid, edge.fact));
        }

        let template = if self.prompts.edges.is_empty() {
            prompts::DEDUPE_EDGES
        } else {
            self.prompts.edges.as_str()
        };
        let prompt = fill_template(template, &[new_fact, existing_facts.as_str()]);

        let response = self.llm.generate(&prompt).await?;
        let result: ContradictionResult = parse_llm_json("contradiction check", &response)?;
        Ok(result.contradicted_edge_uuids)
    }
}

fn serialize_nodes(nodes: &[EntityNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        out.push_str(&format!("- UUID: {}, Name: {}\n", node.uuid, node.name));
    }
    out
}
