//! Model-driven extraction of entities and relations from episode content.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EpigraphError, Result};
use crate::llm_client::LlmClient;
use crate::types::ExtractionPrompts;
use crate::utils::json::parse_llm_json;
use crate::utils::text::{fill_template, normalize_whitespace};

/// One entity the model pulled out of an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type_id: i64,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractedEntities {
    pub extracted_entities: Vec<ExtractedEntity>,
}

/// One relation the model asserted between two already-known entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEdge {
    pub source_node_uuid: String,
    pub target_node_uuid: String,
    pub relation_type: String,
    pub fact: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractedEdges {
    pub extracted_edges: Vec<ExtractedEdge>,
}

/// Extracts entities and relations from episodes via the language model.
///
/// Malformed JSON is fatal for the requesting step; retry is the
/// responsibility of the model client, not this layer.
pub struct Extractor<L> {
    llm: Arc<L>,
    prompts: ExtractionPrompts,
}

impl<L: LlmClient> Extractor<L> {
    pub fn new(llm: Arc<L>, prompts: ExtractionPrompts) -> Self {
        Self { llm, prompts }
    }

    /// Extract entities from `content` given an entity-type schema and prior
    /// episode contexts for coreference.
    pub async fn extract_nodes(
        &self,
        content: &str,
        entity_types: &str,
        previous_episodes: &[String],
    ) -> Result<Vec<ExtractedEntity>> {
        let mut prompt = fill_template(&self.prompts.nodes, &[entity_types, content]);

        if !previous_episodes.is_empty() {
            prompt.push_str("\n\nPrior episodes, for pronoun and alias resolution:\n");
            for episode in previous_episodes {
                prompt.push_str("- ");
                prompt.push_str(episode);
                prompt.push('\n');
            }
        }

        let response = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| EpigraphError::Ingestion(format!("failed to generate entities: {e}")))?;

        let result: ExtractedEntities = parse_llm_json("entity extraction", &response)?;

        Ok(result
            .extracted_entities
            .into_iter()
            .map(|mut entity| {
                entity.name = normalize_whitespace(&entity.name);
                entity
            })
            .collect())
    }

    /// Extract relations among known entities, handed in as (uuid, name)
    /// pairs so the model can reference them by uuid.
    pub async fn extract_edges(&self, nodes: &[(String, String)]) -> Result<Vec<ExtractedEdge>> {
        let mut node_context = String::new();
        for (uuid, name) in nodes {
            node_context.push_str(&format!("- UUID: {uuid}, Name: {name}\n"));
        }

        let prompt = fill_template(&self.prompts.edges, &[node_context.as_str()]);

        let response = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| EpigraphError::Ingestion(format!("failed to generate edges: {e}")))?;

        let result: ExtractedEdges = parse_llm_json("edge extraction", &response)?;

        Ok(result
            .extracted_edges
            .into_iter()
            .map(|mut edge| {
                edge.fact = normalize_whitespace(&edge.fact);
                edge
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use crate::types::ExtractionPrompts;

    fn extractor(llm: MockLlm) -> Extractor<MockLlm> {
        Extractor::new(Arc::new(llm), ExtractionPrompts::default())
    }

    #[tokio::test]
    async fn test_extract_nodes_parses_entities() {
        let llm = MockLlm::with_responses(&[r#"{
            "extracted_entities": [
                {"name": "Alice", "entity_type_id": 1},
                {"name": "Seattle", "entity_type_id": 2, "attributes": {"kind": "city"}}
            ]
        }"#]);
        let extractor = extractor(llm);

        let entities = extractor
            .extract_nodes("Alice lives in Seattle.", "Person, Place", &[])
            .await
            .unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Alice");
        assert_eq!(entities[1].entity_type_id, 2);
        assert_eq!(entities[1].attributes["kind"], "city");
    }

    #[tokio::test]
    async fn test_extract_nodes_tolerates_markdown_wrapping() {
        let llm = MockLlm::with_responses(&[
            "Here you go:\n```json\n{\"extracted_entities\": [{\"name\": \"Bob\", \"entity_type_id\": 1}]}\n```",
        ]);
        let extractor = extractor(llm);

        let entities = extractor
            .extract_nodes("Bob.", "Person", &[])
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Bob");
    }

    #[tokio::test]
    async fn test_extract_nodes_normalizes_names() {
        let llm = MockLlm::with_responses(&[
            r#"{"extracted_entities": [{"name": "  Alice \n Smith ", "entity_type_id": 1}]}"#,
        ]);
        let extractor = extractor(llm);

        let entities = extractor.extract_nodes("x", "Person", &[]).await.unwrap();
        assert_eq!(entities[0].name, "Alice Smith");
    }

    #[tokio::test]
    async fn test_extract_nodes_invalid_json_is_fatal() {
        let llm = MockLlm::with_responses(&["not json at all"]);
        let extractor = extractor(llm);

        let err = extractor
            .extract_nodes("x", "Person", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EpigraphError::ModelOutput { .. }));
    }

    #[tokio::test]
    async fn test_extract_nodes_includes_prior_context() {
        let llm = MockLlm::with_responses(&[r#"{"extracted_entities": []}"#]);
        let extractor = Extractor::new(Arc::new(llm), ExtractionPrompts::default());

        extractor
            .extract_nodes(
                "She moved.",
                "Person",
                &["Alice lives in Seattle.".to_string()],
            )
            .await
            .unwrap();

        let prompts = extractor.llm.prompts();
        assert!(prompts[0].contains("She moved."));
        assert!(prompts[0].contains("Alice lives in Seattle."));
    }

    #[tokio::test]
    async fn test_extract_edges_serializes_node_list_into_prompt() {
        let llm = MockLlm::with_responses(&[r#"{
            "extracted_edges": [
                {"source_node_uuid": "u-1", "target_node_uuid": "u-2", "relation_type": "KNOWS", "fact": "Alice knows Bob"}
            ]
        }"#]);
        let extractor = Extractor::new(Arc::new(llm), ExtractionPrompts::default());

        let nodes = vec![
            ("u-1".to_string(), "Alice".to_string()),
            ("u-2".to_string(), "Bob".to_string()),
        ];
        let edges = extractor.extract_edges(&nodes).await.unwrap();

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_node_uuid, "u-1");
        assert_eq!(edges[0].relation_type, "KNOWS");

        let prompts = extractor.llm.prompts();
        assert!(prompts[0].contains("UUID: u-1, Name: Alice"));
        assert!(prompts[0].contains("UUID: u-2, Name: Bob"));
    }

    #[tokio::test]
    async fn test_extract_edges_wrong_shape_names_field() {
        let llm = MockLlm::with_responses(&[r#"{"edges": []}"#]);
        let extractor = extractor(llm);

        let err = extractor.extract_edges(&[]).await.unwrap_err();
        match err {
            EpigraphError::ModelValidation { message, .. } => {
                assert!(message.contains("extracted_edges"), "message was: {message}");
            }
            e => panic!("expected ModelValidation, got {e:?}"),
        }
    }
}
