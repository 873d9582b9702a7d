//! HasEpisodeEdge — HAS_EPISODE relationship (SagaNode → EpisodicNode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An edge attaching an episode to a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HasEpisodeEdge {
    /// Unique identifier for this edge.
    pub uuid: String,
    /// UUID of the source SagaNode.
    pub source_node_uuid: String,
    /// UUID of the target EpisodicNode.
    pub target_node_uuid: String,
    /// Group / partition identifier.
    pub group_id: String,
    /// When this edge was created in the graph.
    pub created_at: DateTime<Utc>,
}
