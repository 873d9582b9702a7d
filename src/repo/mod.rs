//! Graph repository: the fixed vocabulary of store operations.
//!
//! Every parameterized query in the crate lives in this module; no other
//! component ever constructs query text. All writes use MERGE semantics and
//! are idempotent under retry; reads return empty results, never errors, for
//! missing keys. Attribute maps are bound as JSON strings for store
//! compatibility, timestamps as RFC3339 strings with `""` meaning "unset".

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::driver::{GraphDriver, Record};
use crate::edges::community::CommunityEdge;
use crate::edges::entity::EntityEdge;
use crate::edges::episodic::EpisodicEdge;
use crate::edges::has_episode::HasEpisodeEdge;
use crate::edges::next_episode::NextEpisodeEdge;
use crate::errors::Result;
use crate::nodes::community::CommunityNode;
use crate::nodes::entity::EntityNode;
use crate::nodes::episodic::EpisodicNode;
use crate::nodes::saga::SagaNode;
use crate::utils::datetime::{format_optional_rfc3339, format_rfc3339, parse_flexible_datetime};

// ── Queries ───────────────────────────────────────────────────────────────────

const SAVE_ENTITY_NODE: &str = r#"
    MERGE (n:Entity {uuid: $uuid})
    SET n.name = $name,
        n.group_id = $group_id,
        n.created_at = $created_at,
        n.summary = $summary,
        n.name_embedding = $name_embedding,
        n.attributes = $attributes,
        n.labels = $labels
    RETURN n.uuid AS uuid
"#;

const SAVE_EPISODIC_NODE: &str = r#"
    MERGE (n:Episodic {uuid: $uuid})
    SET n.name = $name,
        n.group_id = $group_id,
        n.created_at = $created_at,
        n.valid_at = $valid_at,
        n.content = $content,
        n.source = $source,
        n.source_description = $source_description,
        n.entity_edges = $entity_edges
    RETURN n.uuid AS uuid
"#;

const SAVE_COMMUNITY_NODE: &str = r#"
    MERGE (n:Community {uuid: $uuid})
    SET n.name = $name,
        n.group_id = $group_id,
        n.created_at = $created_at,
        n.summary = $summary,
        n.name_embedding = $name_embedding
    RETURN n.uuid AS uuid
"#;

const SAVE_SAGA_NODE: &str = r#"
    MERGE (n:Saga {uuid: $uuid})
    SET n.name = $name,
        n.group_id = $group_id,
        n.created_at = $created_at
    RETURN n.uuid AS uuid
"#;

const SAVE_ENTITY_EDGE: &str = r#"
    MATCH (source:Entity {uuid: $source_uuid})
    MATCH (target:Entity {uuid: $target_uuid})
    MERGE (source)-[e:RELATES_TO {uuid: $uuid}]->(target)
    SET e.name = $name,
        e.fact = $fact,
        e.group_id = $group_id,
        e.created_at = $created_at,
        e.expired_at = $expired_at,
        e.valid_at = $valid_at,
        e.invalid_at = $invalid_at,
        e.episodes = $episodes,
        e.fact_embedding = $fact_embedding,
        e.attributes = $attributes
    RETURN e.uuid AS uuid
"#;

// Link edges merge on the relationship pattern, not the uuid, so re-ingestion
// cannot produce a second MENTIONS / HAS_EPISODE / NEXT_EPISODE edge for the
// same pair. The uuid is assigned on first creation only.
const SAVE_EPISODIC_EDGE: &str = r#"
    MATCH (episode:Episodic {uuid: $source_uuid})
    MATCH (node:Entity {uuid: $target_uuid})
    MERGE (episode)-[e:MENTIONS]->(node)
    ON CREATE SET e.uuid = $uuid,
        e.group_id = $group_id,
        e.created_at = $created_at
    RETURN e.uuid AS uuid
"#;

const SAVE_COMMUNITY_EDGE: &str = r#"
    MATCH (c:Community {uuid: $source_uuid})
    MATCH (n:Entity {uuid: $target_uuid})
    MERGE (c)-[e:HAS_MEMBER]->(n)
    ON CREATE SET e.uuid = $uuid,
        e.group_id = $group_id,
        e.created_at = $created_at
    RETURN e.uuid AS uuid
"#;

const SAVE_HAS_EPISODE_EDGE: &str = r#"
    MATCH (source:Saga {uuid: $source_uuid})
    MATCH (target:Episodic {uuid: $target_uuid})
    MERGE (source)-[e:HAS_EPISODE]->(target)
    ON CREATE SET e.uuid = $uuid,
        e.group_id = $group_id,
        e.created_at = $created_at
    RETURN e.uuid AS uuid
"#;

const SAVE_NEXT_EPISODE_EDGE: &str = r#"
    MATCH (source:Episodic {uuid: $source_uuid})
    MATCH (target:Episodic {uuid: $target_uuid})
    MERGE (source)-[e:NEXT_EPISODE]->(target)
    ON CREATE SET e.uuid = $uuid,
        e.group_id = $group_id,
        e.created_at = $created_at
    RETURN e.uuid AS uuid
"#;

const GET_SAGA_BY_NAME: &str = r#"
    MATCH (s:Saga {name: $name, group_id: $group_id})
    RETURN s.uuid AS uuid, s.name AS name, s.group_id AS group_id, s.created_at AS created_at
"#;

const GET_PREVIOUS_EPISODE_IN_SAGA: &str = r#"
    MATCH (s:Saga {uuid: $saga_uuid})-[:HAS_EPISODE]->(e:Episodic)
    WHERE e.uuid <> $current_episode_uuid
    RETURN e.uuid AS uuid
    ORDER BY e.valid_at DESC, e.created_at DESC
    LIMIT 1
"#;

const INVALIDATE_EDGE: &str = r#"
    MATCH ()-[e:RELATES_TO {uuid: $uuid}]->()
    SET e.invalid_at = $invalid_at
    RETURN e.uuid AS uuid
"#;

const GET_ACTIVE_EDGES: &str = r#"
    MATCH (source:Entity {uuid: $source_uuid})-[e:RELATES_TO]->(target:Entity {uuid: $target_uuid})
    WHERE e.name = $name AND (e.invalid_at IS NULL OR e.invalid_at = "")
    RETURN e.uuid AS uuid, e.fact AS fact, e.name AS name, target.uuid AS target_uuid
"#;

const GET_ACTIVE_EDGES_FROM_SOURCE: &str = r#"
    MATCH (source:Entity {uuid: $source_uuid})-[e:RELATES_TO]->(target:Entity)
    WHERE (e.invalid_at IS NULL OR e.invalid_at = "")
    RETURN e.uuid AS uuid, e.fact AS fact, e.name AS name, target.uuid AS target_uuid
"#;

const GET_GROUP_ENTITIES: &str = r#"
    MATCH (n:Entity {group_id: $group_id})
    RETURN n.uuid AS uuid, n.name AS name, n.summary AS summary
"#;

const GET_GROUP_ACTIVE_EDGES: &str = r#"
    MATCH (n:Entity {group_id: $group_id})-[e:RELATES_TO]->(m:Entity {group_id: $group_id})
    WHERE (e.invalid_at IS NULL OR e.invalid_at = "")
    RETURN e.uuid AS uuid, n.uuid AS source_uuid, m.uuid AS target_uuid, e.name AS name, e.fact AS fact
"#;

const GET_RECENT_EPISODES: &str = r#"
    MATCH (e:Episodic)
    WHERE e.group_id = $group_id
    RETURN e.uuid AS uuid, e.content AS content, e.created_at AS created_at
    ORDER BY e.created_at DESC
    LIMIT $limit
"#;

const TEXT_MATCH_EDGES: &str = r#"
    MATCH (n:Entity)-[e:RELATES_TO]->(m:Entity)
    WHERE e.group_id = $group_id
      AND (e.invalid_at IS NULL OR e.invalid_at = "")
      AND e.fact CONTAINS $query
    RETURN e.uuid AS uuid,
           n.uuid AS source_uuid,
           m.uuid AS target_uuid,
           e.name AS name,
           e.fact AS fact,
           e.created_at AS created_at,
           e.valid_at AS valid_at,
           e.episodes AS episodes
    LIMIT 20
"#;

const VECTOR_MATCH_EDGES: &str = r#"
    MATCH (n:Entity)-[e:RELATES_TO]->(m:Entity)
    WHERE e.group_id = $group_id
      AND (e.invalid_at IS NULL OR e.invalid_at = "")
      AND e.fact_embedding IS NOT NULL
    WITH e, n, m,
         reduce(dot = 0.0, i IN range(0, size(e.fact_embedding)-1) | dot + e.fact_embedding[i] * $embedding[i]) /
         (sqrt(reduce(s1 = 0.0, x IN e.fact_embedding | s1 + x^2)) * sqrt(reduce(s2 = 0.0, y IN $embedding | s2 + y^2))) AS score
    ORDER BY score DESC
    RETURN e.uuid AS uuid,
           n.uuid AS source_uuid,
           m.uuid AS target_uuid,
           e.name AS name,
           e.fact AS fact,
           e.created_at AS created_at,
           e.valid_at AS valid_at,
           e.episodes AS episodes,
           score
    LIMIT 20
"#;

/// Per-label uuid and group_id indices. Stores that already have one (or use
/// a different DDL dialect) report an error, which is logged and skipped.
const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX ON :Entity(uuid);",
    "CREATE INDEX ON :Episodic(uuid);",
    "CREATE INDEX ON :Community(uuid);",
    "CREATE INDEX ON :Saga(uuid);",
    "CREATE INDEX ON :Entity(group_id);",
    "CREATE INDEX ON :Episodic(group_id);",
    "CREATE INDEX ON :Community(group_id);",
    "CREATE INDEX ON :Saga(group_id);",
];

// ── Read models ───────────────────────────────────────────────────────────────

/// Projection of an active RELATES_TO edge, as returned by the active-edge
/// reads. Carries exactly what dedup, contradiction checking, and community
/// detection need.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRef {
    pub uuid: String,
    pub source_node_uuid: String,
    pub target_node_uuid: String,
    pub name: String,
    pub fact: String,
}

/// A recent episode's identity and content, for extraction context windows.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentEpisode {
    pub uuid: String,
    pub content: String,
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Typed operations over the external graph store.
pub struct GraphRepository<D> {
    driver: D,
}

impl<D: GraphDriver> GraphRepository<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    // -- writes --

    pub async fn save_entity(&self, node: &EntityNode) -> Result<()> {
        let params = params([
            ("uuid", json!(node.uuid)),
            ("name", json!(node.name)),
            ("group_id", json!(node.group_id)),
            ("created_at", json!(format_rfc3339(&node.created_at))),
            ("summary", json!(node.summary)),
            ("name_embedding", embedding_param(&node.name_embedding)),
            ("attributes", json!(attributes_json(&node.attributes))),
            ("labels", json!(node.labels)),
        ]);
        self.driver.execute(SAVE_ENTITY_NODE, params).await?;
        Ok(())
    }

    pub async fn save_episode(&self, episode: &EpisodicNode) -> Result<()> {
        let params = params([
            ("uuid", json!(episode.uuid)),
            ("name", json!(episode.name)),
            ("group_id", json!(episode.group_id)),
            ("created_at", json!(format_rfc3339(&episode.created_at))),
            ("valid_at", json!(format_rfc3339(&episode.valid_at))),
            ("content", json!(episode.content)),
            ("source", json!(episode.source.as_str())),
            ("source_description", json!(episode.source_description)),
            ("entity_edges", json!(episode.entity_edges)),
        ]);
        self.driver.execute(SAVE_EPISODIC_NODE, params).await?;
        Ok(())
    }

    pub async fn save_entity_edge(&self, edge: &EntityEdge) -> Result<()> {
        let params = params([
            ("uuid", json!(edge.uuid)),
            ("source_uuid", json!(edge.source_node_uuid)),
            ("target_uuid", json!(edge.target_node_uuid)),
            ("name", json!(edge.name)),
            ("fact", json!(edge.fact)),
            ("group_id", json!(edge.group_id)),
            ("created_at", json!(format_rfc3339(&edge.created_at))),
            ("expired_at", json!(format_optional_rfc3339(&edge.expired_at))),
            ("valid_at", json!(format_rfc3339(&edge.valid_at))),
            ("invalid_at", json!(format_optional_rfc3339(&edge.invalid_at))),
            ("episodes", json!(edge.episodes)),
            ("fact_embedding", embedding_param(&edge.fact_embedding)),
            ("attributes", json!(attributes_json(&edge.attributes))),
        ]);
        self.driver.execute(SAVE_ENTITY_EDGE, params).await?;
        Ok(())
    }

    pub async fn save_episodic_edge(&self, edge: &EpisodicEdge) -> Result<()> {
        let params = link_edge_params(
            &edge.uuid,
            &edge.source_node_uuid,
            &edge.target_node_uuid,
            &edge.group_id,
            &edge.created_at,
        );
        self.driver.execute(SAVE_EPISODIC_EDGE, params).await?;
        Ok(())
    }

    pub async fn save_community_node(&self, node: &CommunityNode) -> Result<()> {
        let params = params([
            ("uuid", json!(node.uuid)),
            ("name", json!(node.name)),
            ("group_id", json!(node.group_id)),
            ("created_at", json!(format_rfc3339(&node.created_at))),
            ("summary", json!(node.summary)),
            ("name_embedding", embedding_param(&node.name_embedding)),
        ]);
        self.driver.execute(SAVE_COMMUNITY_NODE, params).await?;
        Ok(())
    }

    pub async fn save_community_edge(&self, edge: &CommunityEdge) -> Result<()> {
        let params = link_edge_params(
            &edge.uuid,
            &edge.source_node_uuid,
            &edge.target_node_uuid,
            &edge.group_id,
            &edge.created_at,
        );
        self.driver.execute(SAVE_COMMUNITY_EDGE, params).await?;
        Ok(())
    }

    pub async fn save_saga(&self, saga: &SagaNode) -> Result<()> {
        let params = params([
            ("uuid", json!(saga.uuid)),
            ("name", json!(saga.name)),
            ("group_id", json!(saga.group_id)),
            ("created_at", json!(format_rfc3339(&saga.created_at))),
        ]);
        self.driver.execute(SAVE_SAGA_NODE, params).await?;
        Ok(())
    }

    pub async fn save_has_episode(&self, edge: &HasEpisodeEdge) -> Result<()> {
        let params = link_edge_params(
            &edge.uuid,
            &edge.source_node_uuid,
            &edge.target_node_uuid,
            &edge.group_id,
            &edge.created_at,
        );
        self.driver.execute(SAVE_HAS_EPISODE_EDGE, params).await?;
        Ok(())
    }

    pub async fn save_next_episode(&self, edge: &NextEpisodeEdge) -> Result<()> {
        let params = link_edge_params(
            &edge.uuid,
            &edge.source_node_uuid,
            &edge.target_node_uuid,
            &edge.group_id,
            &edge.created_at,
        );
        self.driver.execute(SAVE_NEXT_EPISODE_EDGE, params).await?;
        Ok(())
    }

    /// Set `invalid_at` on an edge. The field is never cleared afterwards.
    pub async fn invalidate_edge(&self, uuid: &str, invalid_at: DateTime<Utc>) -> Result<()> {
        let params = params([
            ("uuid", json!(uuid)),
            ("invalid_at", json!(format_rfc3339(&invalid_at))),
        ]);
        self.driver.execute(INVALIDATE_EDGE, params).await?;
        Ok(())
    }

    // -- reads --

    pub async fn get_saga_by_name(&self, name: &str, group_id: &str) -> Result<Option<SagaNode>> {
        let params = params([("name", json!(name)), ("group_id", json!(group_id))]);
        let result = self.driver.execute(GET_SAGA_BY_NAME, params).await?;

        Ok(result.records.first().map(|rec| SagaNode {
            uuid: rec.get_str_or_empty("uuid"),
            name: name.to_string(),
            group_id: group_id.to_string(),
            created_at: parse_record_datetime(rec, "created_at"),
        }))
    }

    /// The most recent other episode already linked to the saga, by valid_at
    /// then created_at descending.
    pub async fn find_previous_episode_in_saga(
        &self,
        saga_uuid: &str,
        current_episode_uuid: &str,
    ) -> Result<Option<String>> {
        let params = params([
            ("saga_uuid", json!(saga_uuid)),
            ("current_episode_uuid", json!(current_episode_uuid)),
        ]);
        let result = self
            .driver
            .execute(GET_PREVIOUS_EPISODE_IN_SAGA, params)
            .await?;

        Ok(result
            .records
            .first()
            .and_then(|rec| rec.get_str("uuid"))
            .map(ToOwned::to_owned))
    }

    pub async fn get_group_entities(&self, group_id: &str) -> Result<Vec<EntityNode>> {
        let params = params([("group_id", json!(group_id))]);
        let result = self.driver.execute(GET_GROUP_ENTITIES, params).await?;

        Ok(result
            .records
            .iter()
            .map(|rec| {
                let mut node = EntityNode::new(
                    rec.get_str_or_empty("uuid"),
                    rec.get_str_or_empty("name"),
                    group_id,
                    DateTime::<Utc>::UNIX_EPOCH,
                );
                node.summary = rec.get_str_or_empty("summary");
                node
            })
            .collect())
    }

    pub async fn get_group_active_edges(&self, group_id: &str) -> Result<Vec<EdgeRef>> {
        let params = params([("group_id", json!(group_id))]);
        let result = self.driver.execute(GET_GROUP_ACTIVE_EDGES, params).await?;

        Ok(result
            .records
            .iter()
            .map(|rec| EdgeRef {
                uuid: rec.get_str_or_empty("uuid"),
                source_node_uuid: rec.get_str_or_empty("source_uuid"),
                target_node_uuid: rec.get_str_or_empty("target_uuid"),
                name: rec.get_str_or_empty("name"),
                fact: rec.get_str_or_empty("fact"),
            })
            .collect())
    }

    pub async fn get_active_edges_from_source(&self, source_uuid: &str) -> Result<Vec<EdgeRef>> {
        let params = params([("source_uuid", json!(source_uuid))]);
        let result = self
            .driver
            .execute(GET_ACTIVE_EDGES_FROM_SOURCE, params)
            .await?;

        Ok(result
            .records
            .iter()
            .map(|rec| EdgeRef {
                uuid: rec.get_str_or_empty("uuid"),
                source_node_uuid: source_uuid.to_string(),
                target_node_uuid: rec.get_str_or_empty("target_uuid"),
                name: rec.get_str_or_empty("name"),
                fact: rec.get_str_or_empty("fact"),
            })
            .collect())
    }

    pub async fn get_active_edges(
        &self,
        source_uuid: &str,
        target_uuid: &str,
        name: &str,
    ) -> Result<Vec<EdgeRef>> {
        let params = params([
            ("source_uuid", json!(source_uuid)),
            ("target_uuid", json!(target_uuid)),
            ("name", json!(name)),
        ]);
        let result = self.driver.execute(GET_ACTIVE_EDGES, params).await?;

        Ok(result
            .records
            .iter()
            .map(|rec| EdgeRef {
                uuid: rec.get_str_or_empty("uuid"),
                source_node_uuid: source_uuid.to_string(),
                target_node_uuid: rec.get_str_or_empty("target_uuid"),
                name: rec.get_str_or_empty("name"),
                fact: rec.get_str_or_empty("fact"),
            })
            .collect())
    }

    pub async fn get_recent_episodes(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentEpisode>> {
        let params = params([
            ("group_id", json!(group_id)),
            ("limit", json!(limit as i64)),
        ]);
        let result = self.driver.execute(GET_RECENT_EPISODES, params).await?;

        Ok(result
            .records
            .iter()
            .map(|rec| RecentEpisode {
                uuid: rec.get_str_or_empty("uuid"),
                content: rec.get_str_or_empty("content"),
            })
            .collect())
    }

    /// Lexical fallback: the first 20 active edges whose fact contains the
    /// query as a substring.
    pub async fn text_match_edges(&self, group_id: &str, query: &str) -> Result<Vec<EntityEdge>> {
        let params = params([("group_id", json!(group_id)), ("query", json!(query))]);
        let result = self.driver.execute(TEXT_MATCH_EDGES, params).await?;
        Ok(search_edges(&result.records, group_id))
    }

    /// In-store cosine ranking over active edges with a fact embedding,
    /// top 20.
    pub async fn vector_match_edges(
        &self,
        group_id: &str,
        query_vector: &[f32],
    ) -> Result<Vec<EntityEdge>> {
        let params = params([
            ("group_id", json!(group_id)),
            ("embedding", json!(query_vector)),
        ]);
        let result = self.driver.execute(VECTOR_MATCH_EDGES, params).await?;
        Ok(search_edges(&result.records, group_id))
    }

    // -- maintenance --

    /// Create the per-label uuid / group_id indices. Individual failures are
    /// warned and skipped: the index may exist already or the store may use a
    /// different DDL dialect.
    pub async fn build_indices(&self) -> Result<()> {
        for &statement in INDEX_STATEMENTS {
            if let Err(e) = self.driver.execute(statement, Map::new()).await {
                warn!(statement, error = %e, "failed to create index");
            }
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.driver.close().await
    }
}

// ── Param helpers ─────────────────────────────────────────────────────────────

fn params<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn link_edge_params(
    uuid: &str,
    source_uuid: &str,
    target_uuid: &str,
    group_id: &str,
    created_at: &DateTime<Utc>,
) -> Map<String, Value> {
    params([
        ("uuid", json!(uuid)),
        ("source_uuid", json!(source_uuid)),
        ("target_uuid", json!(target_uuid)),
        ("group_id", json!(group_id)),
        ("created_at", json!(format_rfc3339(created_at))),
    ])
}

fn embedding_param(embedding: &Option<Vec<f32>>) -> Value {
    match embedding {
        Some(vec) => json!(vec),
        None => Value::Null,
    }
}

/// Attribute maps are stored as JSON text; `{}` for empty.
fn attributes_json(attributes: &Map<String, Value>) -> String {
    if attributes.is_empty() {
        "{}".to_string()
    } else {
        Value::Object(attributes.clone()).to_string()
    }
}

fn parse_record_datetime(rec: &Record, key: &str) -> DateTime<Utc> {
    rec.get_str(key)
        .and_then(parse_flexible_datetime)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn search_edges(records: &[Record], group_id: &str) -> Vec<EntityEdge> {
    records
        .iter()
        .map(|rec| EntityEdge {
            uuid: rec.get_str_or_empty("uuid"),
            source_node_uuid: rec.get_str_or_empty("source_uuid"),
            target_node_uuid: rec.get_str_or_empty("target_uuid"),
            group_id: group_id.to_string(),
            name: rec.get_str_or_empty("name"),
            fact: rec.get_str_or_empty("fact"),
            fact_embedding: None,
            episodes: rec.get_str_list("episodes"),
            valid_at: parse_record_datetime(rec, "valid_at"),
            invalid_at: None,
            created_at: parse_record_datetime(rec, "created_at"),
            expired_at: None,
            attributes: Map::new(),
        })
        .collect()
}
