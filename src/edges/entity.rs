//! EntityEdge — bitemporal factual relationship between EntityNodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A factual relationship between two entity nodes, with bitemporal metadata.
///
/// - **Valid time** (`valid_at` / `invalid_at`): when the fact was asserted to
///   hold in the real world.
/// - **Transaction time** (`created_at` / `expired_at`): when the edge exists
///   in the graph.
///
/// An edge is *active* while `invalid_at` is unset. Contradiction handling
/// sets `invalid_at` and never clears it; `created_at` is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    /// Unique identifier for this edge.
    pub uuid: String,
    /// UUID of the source EntityNode.
    pub source_node_uuid: String,
    /// UUID of the target EntityNode.
    pub target_node_uuid: String,
    /// Group / partition identifier.
    pub group_id: String,
    /// Relationship label (e.g. "KNOWS", "WORKS_AT").
    pub name: String,
    /// Human-readable fact string.
    pub fact: String,
    /// Optional embedding vector for the fact.
    pub fact_embedding: Option<Vec<f32>>,
    /// Episode UUIDs that evidence this fact.
    pub episodes: Vec<String>,
    /// When the fact was asserted (valid-time start).
    pub valid_at: DateTime<Utc>,
    /// When the fact was superseded (valid-time end).
    pub invalid_at: Option<DateTime<Utc>>,
    /// When this edge was created in the graph (transaction-time start).
    pub created_at: DateTime<Utc>,
    /// When this edge was expired in the graph (transaction-time end).
    pub expired_at: Option<DateTime<Utc>>,
    /// Arbitrary JSON attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityEdge {
    /// An edge is active while it has not been invalidated.
    pub fn is_active(&self) -> bool {
        self.invalid_at.is_none()
    }
}
