//! CommunityNode — represents a detected community cluster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected community cluster of related entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityNode {
    pub uuid: String,
    pub name: String,
    pub group_id: String,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}
