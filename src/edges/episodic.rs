//! EpisodicEdge — MENTIONS relationship (EpisodicNode → EntityNode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An edge representing a MENTIONS relationship from an episode to an entity.
///
/// Carries no facts; the store creates at most one per (episode, entity) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicEdge {
    /// Unique identifier for this edge.
    pub uuid: String,
    /// UUID of the source EpisodicNode.
    pub source_node_uuid: String,
    /// UUID of the target EntityNode.
    pub target_node_uuid: String,
    /// Group / partition identifier.
    pub group_id: String,
    /// When this edge was created in the graph.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn episodic_edge_can_be_constructed() {
        let edge = EpisodicEdge {
            uuid: "mention-1".into(),
            source_node_uuid: "episode-uuid".into(),
            target_node_uuid: "entity-uuid".into(),
            group_id: "g1".into(),
            created_at: Utc::now(),
        };
        assert_eq!(edge.source_node_uuid, "episode-uuid");
        assert_eq!(edge.target_node_uuid, "entity-uuid");
    }

    #[test]
    fn episodic_edge_roundtrip() {
        let edge = EpisodicEdge {
            uuid: "mention-2".into(),
            source_node_uuid: "ep".into(),
            target_node_uuid: "ent".into(),
            group_id: "g1".into(),
            created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&edge).unwrap();
        let restored: EpisodicEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(edge, restored);
    }
}
