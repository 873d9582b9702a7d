//! NextEpisodeEdge — NEXT_EPISODE sequencing (EpisodicNode → EpisodicNode).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An edge linking the previously-latest episode of a saga to the new one.
///
/// The first episode of a saga has no incoming NEXT_EPISODE edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextEpisodeEdge {
    /// Unique identifier for this edge.
    pub uuid: String,
    /// UUID of the predecessor EpisodicNode.
    pub source_node_uuid: String,
    /// UUID of the successor EpisodicNode.
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
    fn next_episode_edge_links_two_distinct_episodes() {
        let edge = NextEpisodeEdge {
            uuid: "next-1".into(),
            source_node_uuid: "ep-1".into(),
            target_node_uuid: "ep-2".into(),
            group_id: "g1".into(),
            created_at: Utc::now(),
        };
        assert_ne!(edge.source_node_uuid, edge.target_node_uuid);
    }

    #[test]
    fn next_episode_edge_roundtrip() {
        let edge = NextEpisodeEdge {
            uuid: "next-2".into(),
            source_node_uuid: "ep-1".into(),
            target_node_uuid: "ep-2".into(),
            group_id: "g1".into(),
            created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&edge).unwrap();
        let restored: NextEpisodeEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(edge, restored);
    }
}
