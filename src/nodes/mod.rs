//! Node types for the knowledge graph.
//!
//! Four node types:
//! - [`entity::EntityNode`] — real-world entities (people, places, concepts)
//! - [`episodic::EpisodicNode`] — ingested data episodes (messages, documents, JSON records)
//! - [`community::CommunityNode`] — detected community clusters
//! - [`saga::SagaNode`] — named episode sequences
//!
//! Node uuids are opaque `String`s; production code mints v4 UUIDs through
//! the orchestrator's generator, tests inject deterministic sequences.

pub mod community;
pub mod entity;
pub mod episodic;
pub mod saga;
