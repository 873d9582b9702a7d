//! SagaNode — a named narrative container for ordered episodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named sequence of related episodes, unique by (group, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaNode {
    pub uuid: String,
    pub name: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}
