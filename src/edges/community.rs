//! CommunityEdge — HAS_MEMBER relationship (CommunityNode → EntityNode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An edge marking an entity as a member of a community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityEdge {
    /// Unique identifier for this edge.
    pub uuid: String,
    /// UUID of the source CommunityNode.
    pub source_node_uuid: String,
    /// UUID of the target EntityNode.
    pub target_node_uuid: String,
    /// Group / partition identifier.
    pub group_id: String,
    /// When this edge was created in the graph.
    pub created_at: DateTime<Utc>,
}
