//! Episode ingestion and graph maintenance orchestration.
//!
//! [`Epigraph`] is a value parameterized by four capabilities (graph driver,
//! LLM, optional embedder, optional reranker), a configuration, a uuid
//! generator, and the component instances built from them. A single ingestion
//! request runs serially through the state machine below; the bulk path fans
//! out under a counting semaphore.
//!
//! Side effects are not transactional across steps: a partial failure may
//! leave entities without edges or edges without refreshed summaries.
//! Subsequent ingests converge via merge-by-uuid semantics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::community::LabelPropagation;
use crate::dedupe::Resolver;
use crate::driver::GraphDriver;
use crate::edges::community::CommunityEdge;
use crate::edges::entity::EntityEdge;
use crate::edges::episodic::EpisodicEdge;
use crate::edges::has_episode::HasEpisodeEdge;
use crate::edges::next_episode::NextEpisodeEdge;
use crate::embedder::EmbedderClient;
use crate::errors::{EpigraphError, Result};
use crate::extraction::{ExtractedEntity, Extractor};
use crate::llm_client::{LlmClient, RerankerClient};
use crate::nodes::community::CommunityNode;
use crate::nodes::entity::EntityNode;
use crate::nodes::episodic::{EpisodeType, EpisodicNode};
use crate::nodes::saga::SagaNode;
use crate::repo::GraphRepository;
use crate::summary::Summarizer;
use crate::types::EngineConfig;

/// Entity-type schema used when the caller passes none.
const DEFAULT_SCHEMA: &str = "Person, Place, Organization";

/// How many recent episodes provide coreference context for extraction.
const CONTEXT_WINDOW: usize = 5;

/// One episode of a bulk ingestion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeData {
    /// Episode name; empty defaults to "message".
    #[serde(default)]
    pub name: String,
    pub content: String,
    /// Saga to link the episode into, if any.
    #[serde(default)]
    pub saga: Option<String>,
    /// Entity-type schema override, if any.
    #[serde(default)]
    pub schema: Option<String>,
}

/// The temporal knowledge-graph engine.
pub struct Epigraph<D, L, E, R> {
    pub(crate) repo: GraphRepository<D>,
    pub(crate) embedder: Option<Arc<E>>,
    pub(crate) reranker: Option<Arc<R>>,
    pub(crate) extractor: Extractor<L>,
    pub(crate) resolver: Resolver<L>,
    pub(crate) summarizer: Summarizer<L>,
    pub(crate) detector: LabelPropagation,
    pub(crate) config: EngineConfig,
    pub(crate) uuid_gen: Box<dyn Fn() -> String + Send + Sync>,
}

impl<D, L, E, R> Epigraph<D, L, E, R>
where
    D: GraphDriver,
    L: LlmClient,
    E: EmbedderClient,
    R: RerankerClient,
{
    pub fn new(
        driver: D,
        llm: L,
        embedder: Option<E>,
        reranker: Option<R>,
        config: EngineConfig,
    ) -> Self {
        let llm = Arc::new(llm);
        Self {
            repo: GraphRepository::new(driver),
            embedder: embedder.map(Arc::new),
            reranker: reranker.map(Arc::new),
            extractor: Extractor::new(llm.clone(), config.extraction.clone()),
            resolver: Resolver::new(llm.clone(), config.deduplication.clone()),
            summarizer: Summarizer::new(llm, config.summary.clone()),
            detector: LabelPropagation::default(),
            config,
            uuid_gen: Box::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replace the uuid generator. Tests install deterministic sequences.
    pub fn with_uuid_generator(
        mut self,
        uuid_gen: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.uuid_gen = Box::new(uuid_gen);
        self
    }

    fn next_uuid(&self) -> String {
        (self.uuid_gen)()
    }

    /// Create the store indices.
    pub async fn build_indices(&self) -> Result<()> {
        self.repo.build_indices().await
    }

    /// Release the underlying store handle.
    pub async fn close(&self) -> Result<()> {
        self.repo.close().await
    }

    // ── Episode ingestion ─────────────────────────────────────────────────────

    /// Ingest one episode of text into the group's graph.
    ///
    /// Runs the full state machine: persist episode, gather context, extract
    /// entities, resolve identities, persist entities and mentions, extract
    /// and reconcile relations, refresh endpoint summaries, link the saga.
    pub async fn add_episode(
        &self,
        group_id: &str,
        name: &str,
        content: &str,
        saga: Option<&str>,
        schema: Option<&str>,
    ) -> Result<()> {
        self.add_episode_internal(group_id, name, content, saga, schema, None)
            .await
    }

    /// Direct entity upsert: mint a uuid, embed the name when possible, and
    /// persist. Returns the node as written.
    pub async fn save_entity_node(
        &self,
        name: &str,
        group_id: &str,
        summary: &str,
    ) -> Result<EntityNode> {
        let mut node = EntityNode::new(self.next_uuid(), name, group_id, Utc::now());
        node.summary = summary.to_string();
        self.save_entity_with_embedding(&mut node).await?;
        Ok(node)
    }

    async fn add_episode_internal(
        &self,
        group_id: &str,
        name: &str,
        content: &str,
        saga: Option<&str>,
        schema: Option<&str>,
        pre_resolved: Option<Vec<EntityNode>>,
    ) -> Result<()> {
        let episode_uuid = self.next_uuid();
        let now = Utc::now();

        // 1. Persist the episode node. Fatal on failure.
        let episode = EpisodicNode {
            uuid: episode_uuid.clone(),
            name: name.to_string(),
            group_id: group_id.to_string(),
            created_at: now,
            source: EpisodeType::Message,
            source_description: "user message".to_string(),
            content: content.to_string(),
            valid_at: now,
            entity_edges: Vec::new(),
        };
        self.repo
            .save_episode(&episode)
            .await
            .map_err(|e| EpigraphError::Ingestion(format!("failed to save episode: {e}")))?;

        let nodes = match pre_resolved {
            // Bulk path: entities were extracted, deduplicated, and saved
            // batch-wide; only the mentions and edges remain for this episode.
            Some(nodes) => nodes,
            None => {
                // 2. Context for coreference, excluding this episode.
                let previous = self
                    .retrieve_previous_episodes(group_id, &episode_uuid, CONTEXT_WINDOW)
                    .await
                    .unwrap_or_default();

                // 3. Extract entities. Fatal on failure.
                let schema = schema.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SCHEMA);
                let extracted = self
                    .extractor
                    .extract_nodes(content, schema, &previous)
                    .await
                    .map_err(|e| EpigraphError::Ingestion(format!("extraction failed: {e}")))?;
                let new_nodes = self.entities_from_extraction(extracted, group_id, now);

                // 4. Resolve identities against the group, when it has any.
                match self.repo.get_group_entities(group_id).await {
                    Ok(existing) if !existing.is_empty() && !new_nodes.is_empty() => {
                        self.resolver.resolve_entities(new_nodes, &existing).await
                    }
                    _ => new_nodes,
                }
            }
        };

        // 5. Persist entities and MENTIONS edges, tolerating per-item failures.
        self.save_entities_and_mentions(&nodes, &episode_uuid, group_id, now)
            .await;

        // 6./7. Relations and endpoint summaries need at least two entities.
        if nodes.len() > 1 {
            if let Err(e) = self
                .process_edges_and_summaries(&nodes, &episode_uuid, group_id, now)
                .await
            {
                warn!(error = %e, "edge processing failed, episode remains ingested");
            }
        }

        // 8. Saga linking. Fatal on failure.
        if let Some(saga_name) = saga.filter(|s| !s.is_empty()) {
            self.handle_saga(saga_name, group_id, &episode_uuid, now)
                .await
                .map_err(|e| EpigraphError::Ingestion(format!("failed to handle saga: {e}")))?;
        }

        Ok(())
    }

    /// Up to `limit` recent episode contents of the group, newest first,
    /// excluding `exclude_uuid`.
    async fn retrieve_previous_episodes(
        &self,
        group_id: &str,
        exclude_uuid: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        // Fetch one extra to cover the excluded episode.
        let recent = self.repo.get_recent_episodes(group_id, limit + 1).await?;
        Ok(recent
            .into_iter()
            .filter(|episode| episode.uuid != exclude_uuid)
            .map(|episode| episode.content)
            .take(limit)
            .collect())
    }

    fn entities_from_extraction(
        &self,
        extracted: Vec<ExtractedEntity>,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<EntityNode> {
        extracted
            .into_iter()
            .map(|entity| {
                let mut node = EntityNode::new(self.next_uuid(), entity.name, group_id, now);
                node.attributes = entity.attributes;
                node
            })
            .collect()
    }

    /// Persist each entity (merge by uuid) and its MENTIONS edge. Individual
    /// failures are logged and skipped; a failed entity write also skips its
    /// mention so the edge never references a missing node.
    async fn save_entities_and_mentions(
        &self,
        nodes: &[EntityNode],
        episode_uuid: &str,
        group_id: &str,
        now: DateTime<Utc>,
    ) {
        for node in nodes {
            let mut node = node.clone();
            if let Err(e) = self.save_entity_with_embedding(&mut node).await {
                warn!(entity = %node.name, error = %e, "failed to save entity, skipping mention");
                continue;
            }

            let mention = EpisodicEdge {
                uuid: self.next_uuid(),
                source_node_uuid: episode_uuid.to_string(),
                target_node_uuid: node.uuid.clone(),
                group_id: group_id.to_string(),
                created_at: now,
            };
            if let Err(e) = self.repo.save_episodic_edge(&mention).await {
                warn!(entity = %node.name, error = %e, "failed to save mention edge");
            }
        }
    }

    async fn save_entity_with_embedding(&self, node: &mut EntityNode) -> Result<()> {
        if let Some(embedder) = &self.embedder {
            match embedder.embed(&node.name).await {
                Ok(vector) => node.name_embedding = Some(vector),
                Err(e) => warn!(entity = %node.name, error = %e, "name embedding failed"),
            }
        }
        self.repo.save_entity(node).await
    }

    /// Extract relations among the episode's entities, reconcile each against
    /// the graph (exact dedup, then contradiction invalidation), persist the
    /// survivors, and refresh endpoint summaries from the accumulated facts.
    async fn process_edges_and_summaries(
        &self,
        nodes: &[EntityNode],
        episode_uuid: &str,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let pairs: Vec<(String, String)> = nodes
            .iter()
            .map(|node| (node.uuid.clone(), node.name.clone()))
            .collect();
        let edges = self.extractor.extract_edges(&pairs).await?;

        let mut node_facts: HashMap<String, Vec<String>> = HashMap::new();
        fn credit(uuid: &str, fact: &str, facts: &mut HashMap<String, Vec<String>>) {
            facts
                .entry(uuid.to_string())
                .or_default()
                .push(fact.to_string());
        }

        for edge in edges {
            // Active edges from the source, for dedup and contradiction checks.
            let related = match self
                .repo
                .get_active_edges_from_source(&edge.source_node_uuid)
                .await
            {
                Ok(related) => related,
                Err(e) => {
                    warn!(error = %e, "failed to load active edges, skipping extracted edge");
                    continue;
                }
            };

            // Exact duplicate: the fact flows into endpoint summaries, but no
            // new edge is written and the existing edge stays untouched.
            if Resolver::<L>::find_exact_duplicate(&edge, &related).is_some() {
                credit(&edge.source_node_uuid, &edge.fact, &mut node_facts);
                credit(&edge.target_node_uuid, &edge.fact, &mut node_facts);
                continue;
            }

            // Contradictions invalidate old edges before the new edge is
            // written. A failed check is non-fatal.
            if !related.is_empty() {
                match self.resolver.find_contradictions(&edge.fact, &related).await {
                    Ok(contradicted) => {
                        for uuid in contradicted {
                            if let Err(e) = self.repo.invalidate_edge(&uuid, now).await {
                                warn!(edge = %uuid, error = %e, "failed to invalidate edge");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "contradiction check failed, writing edge anyway"),
                }
            }

            let mut entity_edge = EntityEdge {
                uuid: self.next_uuid(),
                source_node_uuid: edge.source_node_uuid.clone(),
                target_node_uuid: edge.target_node_uuid.clone(),
                group_id: group_id.to_string(),
                name: edge.relation_type.clone(),
                fact: edge.fact.clone(),
                fact_embedding: None,
                episodes: vec![episode_uuid.to_string()],
                valid_at: now,
                invalid_at: None,
                created_at: now,
                expired_at: None,
                attributes: serde_json::Map::new(),
            };
            if let Some(embedder) = &self.embedder {
                match embedder.embed(&entity_edge.fact).await {
                    Ok(vector) => entity_edge.fact_embedding = Some(vector),
                    Err(e) => warn!(error = %e, "fact embedding failed"),
                }
            }
            if let Err(e) = self.repo.save_entity_edge(&entity_edge).await {
                warn!(error = %e, "failed to save entity edge");
            }

            credit(&edge.source_node_uuid, &edge.fact, &mut node_facts);
            credit(&edge.target_node_uuid, &edge.fact, &mut node_facts);
        }

        // Refresh summaries for every endpoint that accumulated facts.
        for node in nodes {
            if let Some(facts) = node_facts.get(&node.uuid) {
                match self.summarizer.summarize_node(node, facts).await {
                    Ok(summary) => {
                        let mut updated = node.clone();
                        updated.summary = summary;
                        if let Err(e) = self.save_entity_with_embedding(&mut updated).await {
                            warn!(entity = %node.name, error = %e, "failed to save refreshed summary");
                        }
                    }
                    Err(e) => warn!(entity = %node.name, error = %e, "summary refresh failed"),
                }
            }
        }

        Ok(())
    }

    // ── Saga linking ──────────────────────────────────────────────────────────

    async fn handle_saga(
        &self,
        saga_name: &str,
        group_id: &str,
        episode_uuid: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let saga = match self.repo.get_saga_by_name(saga_name, group_id).await? {
            Some(saga) => saga,
            None => {
                let saga = SagaNode {
                    uuid: self.next_uuid(),
                    name: saga_name.to_string(),
                    group_id: group_id.to_string(),
                    created_at: now,
                };
                self.repo.save_saga(&saga).await?;
                saga
            }
        };

        // The first episode of a saga has no predecessor and therefore no
        // incoming NEXT_EPISODE edge.
        if let Some(previous_uuid) = self
            .repo
            .find_previous_episode_in_saga(&saga.uuid, episode_uuid)
            .await?
        {
            let next = NextEpisodeEdge {
                uuid: self.next_uuid(),
                source_node_uuid: previous_uuid,
                target_node_uuid: episode_uuid.to_string(),
                group_id: group_id.to_string(),
                created_at: now,
            };
            self.repo.save_next_episode(&next).await?;
        }

        let has_episode = HasEpisodeEdge {
            uuid: self.next_uuid(),
            source_node_uuid: saga.uuid,
            target_node_uuid: episode_uuid.to_string(),
            group_id: group_id.to_string(),
            created_at: now,
        };
        self.repo.save_has_episode(&has_episode).await
    }

    // ── Bulk ingestion ────────────────────────────────────────────────────────

    /// Ingest a batch of episodes for one group with batch-wide entity dedup.
    ///
    /// Extraction fans out under `concurrency.bulk_ingest`; extracted entities
    /// are deduplicated by name across the batch (first occurrence in input
    /// order wins), resolved against the group once, and persisted once. The
    /// per-episode pipeline then runs concurrently with the pre-resolved
    /// entities. Edge ordering across episodes is not preserved relative to
    /// their `created_at`; callers needing strict ordering should submit
    /// sequentially.
    pub async fn bulk_add_episodes(&self, group_id: &str, episodes: &[EpisodeData]) -> Result<()> {
        if episodes.is_empty() {
            return Ok(());
        }
        let now = Utc::now();

        // 1. One shared context window for the whole batch.
        let previous = self
            .retrieve_previous_episodes(group_id, "", CONTEXT_WINDOW)
            .await
            .unwrap_or_default();

        let limit = self.config.concurrency.bulk_ingest.max(1);
        let semaphore = Semaphore::new(limit);

        // 2. Concurrent extraction, bounded by the semaphore. Dropping the
        // caller's future cancels everything in flight.
        let extractions = join_all(episodes.iter().enumerate().map(|(index, episode)| {
            let previous = &previous;
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                let schema = episode
                    .schema
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_SCHEMA);
                let result = self
                    .extractor
                    .extract_nodes(&episode.content, schema, previous)
                    .await;
                (index, result)
            }
        }))
        .await;

        // 3. Collect by input position; any failure aborts the batch.
        let mut extracted_by_index: BTreeMap<usize, Vec<ExtractedEntity>> = BTreeMap::new();
        let mut errors = Vec::new();
        for (index, result) in extractions {
            match result {
                Ok(entities) => {
                    extracted_by_index.insert(index, entities);
                }
                Err(e) => errors.push(format!("ep[{index}]: {e}")),
            }
        }
        if !errors.is_empty() {
            errors.sort();
            return Err(EpigraphError::Bulk(errors));
        }

        // 4. Batch-wide dedup by name, first occurrence wins.
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut batch_nodes: Vec<EntityNode> = Vec::new();
        for index in 0..episodes.len() {
            if let Some(entities) = extracted_by_index.get(&index) {
                for entity in entities {
                    if seen_names.insert(entity.name.clone()) {
                        let mut node =
                            EntityNode::new(self.next_uuid(), entity.name.clone(), group_id, now);
                        node.attributes = entity.attributes.clone();
                        batch_nodes.push(node);
                    }
                }
            }
        }

        // 5. One resolution pass against the group's existing entities.
        let existing = self
            .repo
            .get_group_entities(group_id)
            .await
            .map_err(|e| EpigraphError::Ingestion(format!("failed to fetch existing entities: {e}")))?;
        let resolved = if existing.is_empty() || batch_nodes.is_empty() {
            batch_nodes
        } else {
            self.resolver.resolve_entities(batch_nodes, &existing).await
        };

        // 6. Persist once, then index by name for the per-episode runs.
        let mut resolved_by_name: HashMap<String, EntityNode> = HashMap::new();
        for mut node in resolved {
            self.save_entity_with_embedding(&mut node)
                .await
                .map_err(|e| {
                    EpigraphError::Ingestion(format!("failed to save entity {}: {e}", node.name))
                })?;
            resolved_by_name.insert(node.name.clone(), node);
        }

        // 7. Per-episode pipeline with pre-resolved entities, same bound.
        let semaphore = Semaphore::new(limit);
        let outcomes = join_all(episodes.iter().enumerate().map(|(index, episode)| {
            let resolved: Vec<EntityNode> = extracted_by_index
                .get(&index)
                .map(|entities| {
                    entities
                        .iter()
                        .filter_map(|entity| resolved_by_name.get(&entity.name).cloned())
                        .collect()
                })
                .unwrap_or_default();
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                let name = if episode.name.is_empty() {
                    "message"
                } else {
                    episode.name.as_str()
                };
                self.add_episode_internal(
                    group_id,
                    name,
                    &episode.content,
                    episode.saga.as_deref(),
                    episode.schema.as_deref(),
                    Some(resolved),
                )
                .await
                .map_err(|e| format!("ep[{index}]: {e}"))
            }
        }))
        .await;

        let mut errors: Vec<String> = outcomes.into_iter().filter_map(|r| r.err()).collect();
        if !errors.is_empty() {
            errors.sort();
            return Err(EpigraphError::Bulk(errors));
        }

        Ok(())
    }

    // ── Community detection ───────────────────────────────────────────────────

    /// Detect communities over the group's entity subgraph, summarize and
    /// name each one, and persist the community nodes and memberships.
    /// Per-cluster failures are logged and skipped.
    pub async fn detect_communities(&self, group_id: &str) -> Result<()> {
        let nodes = self.repo.get_group_entities(group_id).await?;
        let edges = self.repo.get_group_active_edges(group_id).await?;

        let clusters = self.detector.detect(&nodes, &edges);
        debug!(group_id, clusters = clusters.len(), "detected communities");

        let now = Utc::now();
        for (i, cluster) in clusters.iter().enumerate() {
            let summary = match self.summarizer.summarize_community(cluster).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "community summarization failed, skipping cluster");
                    continue;
                }
            };

            let mut name = format!("Community {}", i + 1);
            if !summary.is_empty() {
                match self.summarizer.community_name(&summary).await {
                    Ok(Some(generated)) if !generated.is_empty() => name = generated,
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "community naming failed, keeping fallback name"),
                }
            }

            let mut community = CommunityNode {
                uuid: self.next_uuid(),
                name,
                group_id: group_id.to_string(),
                summary,
                name_embedding: None,
                created_at: now,
            };
            if let Some(embedder) = &self.embedder {
                match embedder.embed(&community.name).await {
                    Ok(vector) => community.name_embedding = Some(vector),
                    Err(e) => warn!(error = %e, "community name embedding failed"),
                }
            }

            if let Err(e) = self.repo.save_community_node(&community).await {
                warn!(error = %e, "failed to save community node, skipping memberships");
                continue;
            }

            for member in cluster {
                let membership = CommunityEdge {
                    uuid: self.next_uuid(),
                    source_node_uuid: community.uuid.clone(),
                    target_node_uuid: member.uuid.clone(),
                    group_id: group_id.to_string(),
                    created_at: now,
                };
                if let Err(e) = self.repo.save_community_edge(&membership).await {
                    warn!(member = %member.uuid, error = %e, "failed to save membership edge");
                }
            }
        }

        Ok(())
    }
}
