//! Edge types for the knowledge graph.
//!
//! Five edge types:
//! - [`entity::EntityEdge`] — RELATES_TO factual relationships between entities (bitemporal)
//! - [`episodic::EpisodicEdge`] — MENTIONS relationships (episode → entity)
//! - [`community::CommunityEdge`] — HAS_MEMBER relationships (community → entity)
//! - [`has_episode::HasEpisodeEdge`] — HAS_EPISODE relationships (saga → episode)
//! - [`next_episode::NextEpisodeEdge`] — NEXT_EPISODE sequencing (episode → episode)

pub mod community;
pub mod entity;
pub mod episodic;
pub mod has_episode;
pub mod next_episode;
