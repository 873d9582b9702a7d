//! EntityNode — represents a real-world entity extracted from episodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The label every entity node carries, in addition to type-specific labels.
pub const ENTITY_LABEL: &str = "Entity";

/// A real-world entity (person, place, concept) extracted from episodes.
///
/// Within a group there is ideally one entity per real-world referent; the
/// resolver enforces this at write time, not the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: String,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    /// Construct a fresh entity with the mandatory `"Entity"` label and no
    /// summary yet.
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        group_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            group_id: group_id.into(),
            labels: vec![ENTITY_LABEL.to_string()],
            summary: String::new(),
            name_embedding: None,
            attributes: Map::new(),
            created_at,
        }
    }
}
