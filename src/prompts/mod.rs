//! Built-in prompt templates.
//!
//! Templates are stored as Rust string literals (not external files) for
//! compile-time inclusion and zero-cost access. Each template uses `%s`
//! placeholders filled left-to-right by [`crate::utils::text::fill_template`];
//! configuration may override every one of them (see [`crate::types::EngineConfig`]).

/// Entity extraction. Slots: entity-type schema, episode content.
pub const EXTRACT_NODES: &str = r#"You are an entity extraction system.
Recognized entity types (name each with its numeric id):
%s

Extract every entity mentioned in the text below. Use the exact surface name.
Assign the closest matching entity_type_id.

Text:
%s

Respond with JSON only:
{ "extracted_entities": [ { "name": "...", "entity_type_id": 1 } ] }"#;

/// Relation extraction. Slot: list of known entities as "- UUID: ..., Name: ...".
pub const EXTRACT_EDGES: &str = r#"You are a relation extraction system.
Known entities:
%s

Identify the factual relationships between these entities, using their UUIDs.
Each relation carries an UPPER_SNAKE relation_type and a one-sentence fact.

Respond with JSON only:
{ "extracted_edges": [ { "source_node_uuid": "...", "target_node_uuid": "...", "relation_type": "WORKS_AT", "fact": "..." } ] }"#;

/// Entity identity resolution. Slots: new entities, existing entities.
pub const DEDUPE_NODES: &str = r#"You are an entity resolution system.
New entities:
%s
Existing entities:
%s

For every new entity that refers to the same real-world thing as an existing
entity, emit a pair. Do not pair entities that merely share a word.

Respond with JSON only:
{ "duplicates": [ { "original_uuid": "existing", "duplicate_uuid": "new", "confidence": 0.9 } ] }"#;

/// Contradiction detection. Slots: new fact, existing facts.
///
/// Used when no `deduplication.edges` template is configured.
pub const DEDUPE_EDGES: &str = r#"Does the New Fact contradict any of the Existing Facts?
Be conservative. Only identify contradictions that represent a change in state
or a logical impossibility (e.g. "lives in Seattle" vs "moved to SF").
New Fact: %s

Existing Facts:
%s

Return a JSON object with a list of UUIDs of the EXISTING facts that are
contradicted by the new fact.
Example: { "contradicted_edge_uuids": ["uuid-1"] }
If none, return empty list."#;

/// Entity summary refresh. Slots: prior summary, new mentions.
pub const SUMMARIZE_NODE: &str = r#"Update the entity summary below with the new mentions.
Keep it to a few sentences and preserve still-true prior information.

Current summary:
%s

New mentions:
%s

Respond with JSON only: { "summary": "..." }"#;

/// Community summary. Slot: member "name: summary" lines.
pub const SUMMARIZE_COMMUNITY: &str = r#"The following entities form one community.
Write a short paragraph describing what connects them.

Members:
%s

Respond with JSON only: { "summary": "..." }"#;
