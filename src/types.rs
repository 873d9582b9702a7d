//! Shared configuration types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::prompts;

fn validate_limit(limit: usize) -> Result<(), validator::ValidationError> {
    if limit == 0 {
        return Err(validator::ValidationError::new("concurrency limit must be > 0"));
    }
    Ok(())
}

/// Prompt templates for entity and relation extraction.
///
/// Each template uses `%s` slots filled left-to-right.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPrompts {
    /// Two slots: entity-type schema, episode content.
    pub nodes: String,
    /// One slot: known-entity list.
    pub edges: String,
}

impl Default for ExtractionPrompts {
    fn default() -> Self {
        Self {
            nodes: prompts::EXTRACT_NODES.to_string(),
            edges: prompts::EXTRACT_EDGES.to_string(),
        }
    }
}

/// Prompt templates for identity resolution and contradiction detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationPrompts {
    /// Two slots: new entities, existing entities.
    pub nodes: String,
    /// Two slots: new fact, existing facts. Empty string selects the
    /// built-in conservative prompt.
    pub edges: String,
}

impl Default for DeduplicationPrompts {
    fn default() -> Self {
        Self {
            nodes: prompts::DEDUPE_NODES.to_string(),
            edges: String::new(),
        }
    }
}

/// Prompt templates for summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    /// Two slots: prior summary, new mentions.
    pub nodes: String,
    /// One slot: member summaries.
    pub communities: String,
    /// One slot: community summary. Empty string skips community naming.
    pub community_name: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            nodes: prompts::SUMMARIZE_NODE.to_string(),
            communities: prompts::SUMMARIZE_COMMUNITY.to_string(),
            community_name: String::new(),
        }
    }
}

/// Bounds for the bulk fan-out paths.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Max parallel extractions during bulk ingestion.
    #[validate(custom(function = "validate_limit"))]
    pub bulk_ingest: usize,
    /// Max parallel queries during bulk search.
    #[validate(custom(function = "validate_limit"))]
    pub bulk_search: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            bulk_ingest: 2,
            bulk_search: 5,
        }
    }
}

/// Engine configuration: prompt templates plus concurrency bounds.
///
/// `Default` carries working built-in templates, so `EngineConfig::default()`
/// is a fully usable configuration. Deserializable from any serde format the
/// embedding application prefers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    pub extraction: ExtractionPrompts,
    pub deduplication: DeduplicationPrompts,
    pub summary: SummaryPrompts,
    #[validate(nested)]
    pub concurrency: ConcurrencyConfig,
}

/// Bootstrap configuration loaded from environment variables.
///
/// Covers the external collaborators: the bolt-protocol graph store and the
/// OpenAI-compatible model endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    /// Bolt connection URI (e.g. `bolt://localhost:7687`). Memgraph and
    /// Neo4j are both accepted.
    #[validate(length(min = 1))]
    pub bolt_uri: String,

    /// Store username.
    pub bolt_user: String,

    /// Store password.
    pub bolt_password: String,

    /// OpenAI API key.
    #[validate(length(min = 1))]
    pub openai_api_key: String,

    /// Chat model name.
    pub model_name: String,

    /// Embedding model name.
    pub embedding_model: String,

    /// Optional group ID for partitioning graph data.
    pub group_id: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bolt_uri: "bolt://localhost:7687".to_string(),
            bolt_user: String::new(),
            bolt_password: String::new(),
            openai_api_key: String::new(),
            model_name: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            group_id: None,
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent),
    /// then reads each variable from the process environment. The required
    /// variable (`OPENAI_API_KEY`) returns a
    /// [`crate::EpigraphError::Validation`] error when absent or empty.
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let bolt_uri =
            std::env::var("BOLT_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string());
        let bolt_user = std::env::var("BOLT_USER").unwrap_or_default();
        let bolt_password = std::env::var("BOLT_PASSWORD").unwrap_or_default();

        let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            crate::EpigraphError::Validation("OPENAI_API_KEY is required".to_string())
        })?;

        let model_name = std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string());
        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let group_id = std::env::var("GROUP_ID").ok();

        let config = Self {
            bolt_uri,
            bolt_user,
            bolt_password,
            openai_api_key,
            model_name,
            embedding_model,
            group_id,
        };

        config
            .validate()
            .map_err(|e| crate::EpigraphError::Validation(e.to_string()))?;

        Ok(config)
    }
}
